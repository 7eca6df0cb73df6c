use crate::types::{
    ProgramErrorCode,
    ProgramId,
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger program {0} not found")]
    ProgramNotFound(ProgramId),

    #[error("ledger request failed: {0}")]
    Network(String),

    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),

    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry rejected the shared secret: {0}")]
    Auth(String),

    #[error("registry request failed: {0}")]
    Network(String),

    #[error("unexpected registry response: {0}")]
    InvalidResponse(String),

    #[error("invalid registry url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    /// The gateway refused the claim with a structured program code, e.g.
    /// during preflight simulation.
    #[error("claim rejected by program: {0}")]
    Program(ProgramErrorCode),

    #[error("claim broadcast failed: {0}")]
    Broadcast(String),

    #[error("signing failed: {0}")]
    Signing(String),

    /// Unstructured rejection text from the gateway.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("no terminal status within {0:?}")]
    Timeout(Duration),

    #[error("confirmation polling failed: {0}")]
    Network(String),
}

/// Local gate failures, raised before anything is submitted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum GateViolation {
    #[error("wallet not connected")]
    NoSigner,

    #[error("You are not whitelisted")]
    NotEligible,

    #[error("Not enough reserves")]
    ReserveExhausted,

    #[error("SOLD OUT!")]
    SoldOut,

    #[error("Minting period hasn't started yet.")]
    NotStarted,
}

/// Every way a claim attempt can fail, as handed to the classifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClaimFailure {
    #[error(transparent)]
    Gate(#[from] GateViolation),

    #[error("claim confirmed with {0}")]
    Program(ProgramErrorCode),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
}
