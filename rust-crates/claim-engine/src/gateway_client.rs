use crate::{
    confirmation::TransactionStatusSource,
    error::{
        LedgerError,
        SubmissionError,
    },
    ledger::{
        BalanceReader,
        LedgerStateReader,
    },
    submitter::{
        ClaimSubmitter,
        SignedClaim,
    },
    types::{
        AccountId,
        AllocationState,
        CommitmentLevel,
        ProgramErrorCode,
        ProgramId,
        TxHandle,
        TxStatus,
    },
    wire::{
        AllocationStateDto,
        BalanceDto,
        SubmitClaimRejection,
        SubmitClaimResponse,
        TransactionStatusDto,
        endpoint,
    },
};
use chrono::DateTime;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client of the ledger gateway fronting the mint program.
#[derive(Clone, Debug)]
pub struct HttpLedgerGateway {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpLedgerGateway {
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| LedgerError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                LedgerError::Network(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        endpoint(&self.base_url, segments).map_err(LedgerError::InvalidUrl)
    }
}

fn network(e: reqwest::Error) -> LedgerError {
    LedgerError::Network(e.to_string())
}

fn invalid(e: reqwest::Error) -> LedgerError {
    LedgerError::InvalidResponse(e.to_string())
}

impl LedgerStateReader for HttpLedgerGateway {
    async fn read_state(&self, program: &ProgramId) -> Result<AllocationState, LedgerError> {
        let url = self.url(&["programs", program.as_str(), "state"])?;
        let res = self.http.get(url).send().await.map_err(network)?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerError::ProgramNotFound(program.clone()));
        }
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(LedgerError::Network(format!(
                "gateway responded with {status} when reading program state: {body}"
            )));
        }
        let dto: AllocationStateDto = res.json().await.map_err(invalid)?;
        let go_live_at = DateTime::from_timestamp(dto.go_live_at, 0).ok_or_else(|| {
            LedgerError::InvalidResponse(format!(
                "go-live timestamp out of range: {}",
                dto.go_live_at
            ))
        })?;
        Ok(AllocationState {
            program: program.clone(),
            items_available: dto.items_available,
            items_redeemed: dto.items_redeemed,
            items_remaining: dto.items_remaining,
            go_live_at,
        })
    }
}

impl BalanceReader for HttpLedgerGateway {
    async fn balance(&self, account: &AccountId) -> Result<u64, LedgerError> {
        let url = self.url(&["accounts", account.as_str(), "balance"])?;
        let res = self.http.get(url).send().await.map_err(network)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !res.status().is_success() {
            return Err(LedgerError::Network(format!(
                "gateway responded with {} when reading balance",
                res.status()
            )));
        }
        let dto: BalanceDto = res.json().await.map_err(invalid)?;
        Ok(dto.balance)
    }
}

impl ClaimSubmitter for HttpLedgerGateway {
    async fn broadcast(&self, claim: &SignedClaim) -> Result<TxHandle, SubmissionError> {
        let url = endpoint(&self.base_url, &["transactions"])
            .map_err(SubmissionError::Broadcast)?;
        let res = self
            .http
            .post(url)
            .json(claim)
            .send()
            .await
            .map_err(|e| SubmissionError::Broadcast(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| SubmissionError::Broadcast(e.to_string()))?;
        if status.is_success() {
            let dto: SubmitClaimResponse = serde_json::from_slice(&bytes).map_err(|e| {
                SubmissionError::Broadcast(format!("invalid submit response: {e}"))
            })?;
            return Ok(TxHandle::new(dto.tx));
        }
        match serde_json::from_slice::<SubmitClaimRejection>(&bytes) {
            Ok(SubmitClaimRejection {
                code: Some(code), ..
            }) => Err(SubmissionError::Program(ProgramErrorCode(code))),
            Ok(SubmitClaimRejection { message, .. }) => {
                Err(SubmissionError::Rejected(message))
            }
            Err(_) => Err(SubmissionError::Rejected(format!(
                "gateway responded with {status}: {}",
                String::from_utf8_lossy(&bytes)
            ))),
        }
    }
}

impl TransactionStatusSource for HttpLedgerGateway {
    async fn transaction_status(
        &self,
        tx: &TxHandle,
        commitment: CommitmentLevel,
    ) -> Result<TxStatus, LedgerError> {
        let url = self.url(&["transactions", tx.as_str()])?;
        let res = self
            .http
            .get(url)
            .query(&[("commitment", commitment.as_str())])
            .send()
            .await
            .map_err(network)?;
        // not yet visible at this commitment
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(TxStatus::Pending);
        }
        if !res.status().is_success() {
            return Err(LedgerError::Network(format!(
                "gateway responded with {} when polling {tx}",
                res.status()
            )));
        }
        let dto: TransactionStatusDto = res.json().await.map_err(invalid)?;
        Ok(match dto {
            TransactionStatusDto::Pending => TxStatus::Pending,
            TransactionStatusDto::Ok => TxStatus::Confirmed,
            TransactionStatusDto::ProgramError { code } => {
                TxStatus::ProgramError(ProgramErrorCode(code))
            }
        })
    }
}
