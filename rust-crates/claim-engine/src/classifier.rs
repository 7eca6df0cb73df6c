//! Maps every claim failure onto a closed set of user-facing categories.
//!
//! Matching order: local gate causes, then structured program codes, then
//! `0x..` codes scraped from unstructured submission messages. Transport
//! failures of the ledger and the registry are never scraped. Anything left
//! is [`ErrorKind::Unknown`].

use crate::{
    error::{
        ClaimFailure,
        ConfirmationError,
        GateViolation,
        SubmissionError,
    },
    types::ProgramErrorCode,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NoSigner,
    NotEligible,
    ReserveExhausted,
    SoldOut,
    NotStarted,
    InsufficientFunds,
    ConfirmationTimeout,
    Unknown,
}

impl ErrorKind {
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::NoSigner => "wallet not connected",
            ErrorKind::NotEligible => "You are not whitelisted",
            ErrorKind::ReserveExhausted => "Not enough reserves",
            ErrorKind::SoldOut => "SOLD OUT!",
            ErrorKind::NotStarted => "Minting period hasn't started yet.",
            ErrorKind::InsufficientFunds => {
                "Insufficient funds to mint. Please fund your wallet."
            }
            ErrorKind::ConfirmationTimeout => "Mint failed! Please try again!",
            ErrorKind::Unknown => "Minting failed! Please try again!",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }
}

impl From<ErrorKind> for ClassifiedError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub fn classify(failure: &ClaimFailure) -> ClassifiedError {
    let kind = match failure {
        ClaimFailure::Gate(violation) => gate_kind(*violation),
        ClaimFailure::Program(code)
        | ClaimFailure::Submission(SubmissionError::Program(code)) => {
            program_kind(*code)
        }
        ClaimFailure::Confirmation(ConfirmationError::Timeout(_)) => {
            ErrorKind::ConfirmationTimeout
        }
        ClaimFailure::Submission(
            SubmissionError::Rejected(message) | SubmissionError::Broadcast(message),
        ) => legacy_kind(message),
        _ => ErrorKind::Unknown,
    };
    ClassifiedError::new(kind)
}

fn gate_kind(violation: GateViolation) -> ErrorKind {
    match violation {
        GateViolation::NoSigner => ErrorKind::NoSigner,
        GateViolation::NotEligible => ErrorKind::NotEligible,
        GateViolation::ReserveExhausted => ErrorKind::ReserveExhausted,
        GateViolation::SoldOut => ErrorKind::SoldOut,
        GateViolation::NotStarted => ErrorKind::NotStarted,
    }
}

fn program_kind(code: ProgramErrorCode) -> ErrorKind {
    match code {
        ProgramErrorCode::SUPPLY_EXHAUSTED => ErrorKind::SoldOut,
        ProgramErrorCode::NOT_LIVE_YET => ErrorKind::NotStarted,
        ProgramErrorCode::NOT_ENOUGH_FUNDS => ErrorKind::InsufficientFunds,
        _ => ErrorKind::Unknown,
    }
}

fn legacy_kind(message: &str) -> ErrorKind {
    ProgramErrorCode::scan(message)
        .into_iter()
        .map(program_kind)
        .find(|kind| *kind != ErrorKind::Unknown)
        .unwrap_or(ErrorKind::Unknown)
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{
        LedgerError,
        RegistryError,
    };
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn classify__maps_each_canonical_signal_to_its_message() {
        let cases = [
            (
                ClaimFailure::Gate(GateViolation::NoSigner),
                ErrorKind::NoSigner,
                "wallet not connected",
            ),
            (
                ClaimFailure::Gate(GateViolation::NotEligible),
                ErrorKind::NotEligible,
                "You are not whitelisted",
            ),
            (
                ClaimFailure::Gate(GateViolation::ReserveExhausted),
                ErrorKind::ReserveExhausted,
                "Not enough reserves",
            ),
            (
                ClaimFailure::Program(ProgramErrorCode::SUPPLY_EXHAUSTED),
                ErrorKind::SoldOut,
                "SOLD OUT!",
            ),
            (
                ClaimFailure::Program(ProgramErrorCode::NOT_LIVE_YET),
                ErrorKind::NotStarted,
                "Minting period hasn't started yet.",
            ),
            (
                ClaimFailure::Program(ProgramErrorCode::NOT_ENOUGH_FUNDS),
                ErrorKind::InsufficientFunds,
                "Insufficient funds to mint. Please fund your wallet.",
            ),
            (
                ClaimFailure::Confirmation(ConfirmationError::Timeout(
                    Duration::from_secs(30),
                )),
                ErrorKind::ConfirmationTimeout,
                "Mint failed! Please try again!",
            ),
            (
                ClaimFailure::Ledger(LedgerError::Network("connection reset".into())),
                ErrorKind::Unknown,
                "Minting failed! Please try again!",
            ),
        ];

        for (failure, kind, message) in cases {
            let classified = classify(&failure);
            assert_eq!(classified.kind, kind, "{failure:?}");
            assert_eq!(classified.message, message, "{failure:?}");
        }
    }

    #[test]
    fn classify__reads_codes_from_unstructured_submission_errors() {
        // given
        let failure = ClaimFailure::Submission(SubmissionError::Rejected(
            "failed to send transaction: custom program error: 0x135".into(),
        ));

        // when
        let classified = classify(&failure);

        // then
        assert_eq!(classified.kind, ErrorKind::InsufficientFunds);
    }

    #[test]
    fn classify__prefers_structured_submission_code_over_message() {
        let failure =
            ClaimFailure::Submission(SubmissionError::Program(ProgramErrorCode(0x1)));
        assert_eq!(classify(&failure).kind, ErrorKind::Unknown);
    }

    #[test]
    fn classify__treats_confirmation_network_failure_as_unknown() {
        let failure =
            ClaimFailure::Confirmation(ConfirmationError::Network("503".into()));
        assert_eq!(classify(&failure).kind, ErrorKind::Unknown);
    }

    #[test]
    fn classify__does_not_scrape_registry_transport_errors() {
        let failure = ClaimFailure::Registry(RegistryError::Network(
            "GET /member/0x137 timed out".into(),
        ));
        assert_eq!(classify(&failure).kind, ErrorKind::Unknown);
    }

    fn any_failure() -> impl Strategy<Value = ClaimFailure> {
        prop_oneof![
            prop_oneof![
                Just(GateViolation::NoSigner),
                Just(GateViolation::NotEligible),
                Just(GateViolation::ReserveExhausted),
                Just(GateViolation::SoldOut),
                Just(GateViolation::NotStarted),
            ]
            .prop_map(ClaimFailure::Gate),
            any::<u32>().prop_map(|c| ClaimFailure::Program(ProgramErrorCode(c))),
            ".*".prop_map(|m| ClaimFailure::Ledger(LedgerError::Network(m))),
            ".*".prop_map(|m| ClaimFailure::Registry(RegistryError::Auth(m))),
            ".*".prop_map(|m| ClaimFailure::Submission(SubmissionError::Rejected(m))),
            ".*".prop_map(|m| ClaimFailure::Submission(SubmissionError::Broadcast(m))),
            any::<u64>().prop_map(|ms| ClaimFailure::Confirmation(
                ConfirmationError::Timeout(Duration::from_millis(ms))
            )),
        ]
    }

    proptest! {
        #[test]
        fn classify__is_total_and_message_matches_kind(failure in any_failure()) {
            let classified = classify(&failure);
            prop_assert_eq!(classified.message.as_str(), classified.kind.message());
        }
    }
}
