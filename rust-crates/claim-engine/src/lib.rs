//! Client-side engine for claiming one unit from a fixed-supply mint program.
//!
//! The engine reads allocation state from a ledger gateway, checks the
//! allowlist registry, submits one signed claim, waits for confirmation and
//! reconciles afterwards. Front-ends drive it through
//! [`ClaimOrchestrator`] and observe it through [`ClaimOrchestrator::subscribe`].

pub mod classifier;
pub mod config;
pub mod confirmation;
pub mod eligibility;
pub mod error;
pub mod gateway_client;
pub mod ledger;
pub mod orchestrator;
pub mod registry_client;
pub mod submitter;
pub mod types;
pub mod wire;

pub use classifier::{
    ClassifiedError,
    ErrorKind,
    classify,
};
pub use config::{
    EngineConfig,
    GateMode,
    MintTarget,
    RegistryConfig,
};
pub use confirmation::{
    ConfirmationWaiter,
    TransactionStatusSource,
};
pub use eligibility::{
    AllowlistRegistry,
    EligibilityGate,
};
pub use error::{
    ClaimFailure,
    ConfirmationError,
    GateViolation,
    LedgerError,
    RegistryError,
    SubmissionError,
};
pub use gateway_client::HttpLedgerGateway;
pub use ledger::{
    BalanceReader,
    LedgerStateReader,
};
pub use orchestrator::{
    AttemptStatus,
    ClaimAttempt,
    ClaimOrchestrator,
    ClaimOutcome,
    ClaimPhase,
    EligibilityView,
    EngineSnapshot,
    HttpClaimOrchestrator,
    Notice,
};
pub use registry_client::HttpRegistry;
pub use submitter::{
    ClaimSubmitter,
    ClaimTransaction,
    SignedClaim,
    SignerSession,
};
pub use types::{
    AccountId,
    AllocationState,
    CommitmentLevel,
    ConfirmationStatus,
    EligibilityRecord,
    ProgramErrorCode,
    ProgramId,
    TxHandle,
    TxStatus,
};
