use crate::{
    error::LedgerError,
    submitter::SignerSession,
    types::{
        AccountId,
        AllocationState,
        ProgramId,
    },
};
use std::future::Future;
use tracing::warn;

/// Base units per whole token, used for balance display.
pub const BASE_UNITS_PER_TOKEN: u64 = 1_000_000_000;

pub trait LedgerStateReader {
    /// Read counters and go-live of `program` in one remote query.
    fn read_state(
        &self,
        program: &ProgramId,
    ) -> impl Future<Output = Result<AllocationState, LedgerError>> + Send;
}

pub trait BalanceReader {
    /// Balance of `account` in base units.
    fn balance(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<u64, LedgerError>> + Send;
}

/// Fresh allocation read. Without a signer nothing is read and `None` is
/// returned.
pub async fn refresh<L: LedgerStateReader>(
    reader: &L,
    program: &ProgramId,
    signer: Option<&dyn SignerSession>,
) -> Result<Option<AllocationState>, LedgerError> {
    if signer.is_none() {
        return Ok(None);
    }
    let state = reader.read_state(program).await?;
    if !state.is_consistent() {
        warn!(
            program = %state.program,
            available = state.items_available,
            redeemed = state.items_redeemed,
            remaining = state.items_remaining,
            "allocation counters do not add up"
        );
    }
    Ok(Some(state))
}

pub fn display_balance(base_units: u64) -> f64 {
    base_units as f64 / BASE_UNITS_PER_TOKEN as f64
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmissionError;
    use chrono::DateTime;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    struct CountingReader {
        reads: AtomicUsize,
        state: AllocationState,
    }

    impl LedgerStateReader for CountingReader {
        async fn read_state(
            &self,
            _program: &ProgramId,
        ) -> Result<AllocationState, LedgerError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.state.clone())
        }
    }

    struct Alice;

    impl SignerSession for Alice {
        fn public_identity(&self) -> AccountId {
            AccountId::new("alice")
        }

        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>, SubmissionError> {
            Ok(vec![0; 64])
        }
    }

    fn reader(redeemed: u64, remaining: u64) -> CountingReader {
        CountingReader {
            reads: AtomicUsize::new(0),
            state: AllocationState {
                program: ProgramId::new("mint"),
                items_available: 10,
                items_redeemed: redeemed,
                items_remaining: remaining,
                go_live_at: DateTime::UNIX_EPOCH,
            },
        }
    }

    #[tokio::test]
    async fn refresh__without_signer_reads_nothing() {
        let reader = reader(3, 7);

        let state = refresh(&reader, &ProgramId::new("mint"), None).await.unwrap();

        assert_eq!(state, None);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh__returns_inconsistent_counters_as_read() {
        // given
        let reader = reader(3, 3);

        // when
        let state = refresh(&reader, &ProgramId::new("mint"), Some(&Alice))
            .await
            .unwrap()
            .unwrap();

        // then
        assert!(!state.is_consistent());
        assert_eq!(state.items_remaining, 3);
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn display_balance__converts_base_units() {
        assert_eq!(display_balance(2_500_000_000), 2.5);
        assert_eq!(display_balance(0), 0.0);
    }
}
