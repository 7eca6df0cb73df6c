use crate::{
    config::MintTarget,
    error::SubmissionError,
    types::{
        AccountId,
        AllocationState,
        ProgramId,
        TxHandle,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::future::Future;
use tracing::info;

/// A connected wallet with signing rights. Owned by the front-end; the
/// engine only reads it.
pub trait SignerSession: Send + Sync {
    fn public_identity(&self) -> AccountId;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SubmissionError>;
}

/// Unsigned claim of one unit from `program`, paid to `treasury`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransaction {
    pub program: ProgramId,
    pub config: AccountId,
    pub treasury: AccountId,
    pub payer: AccountId,
    pub nonce: u64,
}

impl ClaimTransaction {
    pub fn new(
        program: ProgramId,
        target: &MintTarget,
        payer: AccountId,
        nonce: u64,
    ) -> Self {
        Self {
            program,
            config: target.config.clone(),
            treasury: target.treasury.clone(),
            payer,
            nonce,
        }
    }

    /// Bytes covered by the signature.
    pub fn message(&self) -> Vec<u8> {
        format!(
            "claim:{}:{}:{}:{}:{}",
            self.program, self.config, self.treasury, self.payer, self.nonce
        )
        .into_bytes()
    }

    /// Hex SHA-256 of [`Self::message`]; lets the gateway drop a duplicate
    /// broadcast of the same claim.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.message());
        hex::encode(hasher.finalize())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedClaim {
    pub transaction: ClaimTransaction,
    /// Hex encoded signature over [`ClaimTransaction::message`].
    pub signature: String,
    pub idempotency_key: String,
}

impl SignedClaim {
    pub fn sign(
        transaction: ClaimTransaction,
        signer: &dyn SignerSession,
    ) -> Result<Self, SubmissionError> {
        let signature = hex::encode(signer.sign(&transaction.message())?);
        let idempotency_key = transaction.idempotency_key();
        Ok(Self {
            transaction,
            signature,
            idempotency_key,
        })
    }
}

pub trait ClaimSubmitter {
    /// Broadcast a signed claim once. Implementations must not retry.
    fn broadcast(
        &self,
        claim: &SignedClaim,
    ) -> impl Future<Output = Result<TxHandle, SubmissionError>> + Send;
}

/// Build, sign and broadcast exactly one claim against the program handle of
/// `allocation`.
pub async fn submit_claim<S: ClaimSubmitter>(
    submitter: &S,
    allocation: &AllocationState,
    target: &MintTarget,
    signer: &dyn SignerSession,
) -> Result<TxHandle, SubmissionError> {
    let transaction = ClaimTransaction::new(
        allocation.program.clone(),
        target,
        signer.public_identity(),
        rand::random(),
    );
    let claim = SignedClaim::sign(transaction, signer)?;
    let tx = submitter.broadcast(&claim).await?;
    info!(
        %tx,
        payer = %claim.transaction.payer,
        key = %claim.idempotency_key,
        "claim broadcast"
    );
    Ok(tx)
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSigner;

    impl SignerSession for EchoSigner {
        fn public_identity(&self) -> AccountId {
            AccountId::new("payer")
        }

        fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SubmissionError> {
            Ok(message.iter().rev().copied().collect())
        }
    }

    fn target() -> MintTarget {
        MintTarget {
            program: ProgramId::new("program"),
            config: AccountId::new("config"),
            treasury: AccountId::new("treasury"),
        }
    }

    #[test]
    fn idempotency_key__depends_on_nonce() {
        // given
        let a = ClaimTransaction::new(
            ProgramId::new("program"),
            &target(),
            AccountId::new("payer"),
            1,
        );
        let mut b = a.clone();

        // when
        b.nonce = 2;

        // then
        assert_eq!(a.idempotency_key(), a.clone().idempotency_key());
        assert_ne!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(a.idempotency_key().len(), 64);
    }

    #[test]
    fn sign__hex_encodes_signer_output() {
        let transaction = ClaimTransaction::new(
            ProgramId::new("p"),
            &target(),
            AccountId::new("payer"),
            7,
        );
        let expected: Vec<u8> = transaction.message().into_iter().rev().collect();

        let claim = SignedClaim::sign(transaction, &EchoSigner).unwrap();

        assert_eq!(claim.signature, hex::encode(expected));
        assert_eq!(claim.idempotency_key, claim.transaction.idempotency_key());
    }
}
