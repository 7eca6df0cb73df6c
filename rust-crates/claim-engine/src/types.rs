use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Public identity of an account on the ledger (hex encoded public key).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of the remote mint program.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramId(String);

impl ProgramId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a broadcast transaction, as returned by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocation counters of the mint program, read in one remote query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationState {
    pub program: ProgramId,
    pub items_available: u64,
    pub items_redeemed: u64,
    pub items_remaining: u64,
    pub go_live_at: DateTime<Utc>,
}

impl AllocationState {
    pub fn is_sold_out(&self) -> bool {
        self.items_remaining == 0
    }

    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.go_live_at
    }

    /// Whether `redeemed + remaining == available` holds for this read.
    pub fn is_consistent(&self) -> bool {
        self.items_redeemed.checked_add(self.items_remaining)
            == Some(self.items_available)
    }
}

/// Allowlist entry of one account. `reserve_count` may be reported negative
/// by a misbehaving registry, so it stays signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityRecord {
    pub account: AccountId,
    pub reserve_count: i64,
}

/// How strongly confirmed a transaction status must be before it is treated
/// as terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    /// First seen by the cluster.
    #[default]
    Processed,
    Confirmed,
    Finalized,
}

impl CommitmentLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitmentLevel::Processed => "processed",
            CommitmentLevel::Confirmed => "confirmed",
            CommitmentLevel::Finalized => "finalized",
        }
    }
}

impl fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitmentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" | "singlegossip" => Ok(CommitmentLevel::Processed),
            "confirmed" => Ok(CommitmentLevel::Confirmed),
            "finalized" => Ok(CommitmentLevel::Finalized),
            other => Err(format!("unknown commitment level: {other}")),
        }
    }
}

/// Numeric error code raised by the mint program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgramErrorCode(pub u32);

impl ProgramErrorCode {
    pub const NOT_ENOUGH_FUNDS: Self = Self(0x135);
    pub const SUPPLY_EXHAUSTED: Self = Self(0x137);
    pub const NOT_LIVE_YET: Self = Self(0x138);

    /// Every `0x..` code mentioned in an unstructured error message, in
    /// order of appearance.
    pub fn scan(message: &str) -> Vec<ProgramErrorCode> {
        message
            .match_indices("0x")
            .filter_map(|(idx, _)| {
                let digits: String = message[idx + 2..]
                    .chars()
                    .take_while(char::is_ascii_hexdigit)
                    .collect();
                u32::from_str_radix(&digits, 16).ok().map(ProgramErrorCode)
            })
            .collect()
    }
}

impl fmt::Display for ProgramErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "custom program error: {:#x}", self.0)
    }
}

/// One poll of a transaction's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed,
    ProgramError(ProgramErrorCode),
}

/// Terminal status observed by the confirmation waiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    ProgramError(ProgramErrorCode),
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn state(available: u64, redeemed: u64, remaining: u64) -> AllocationState {
        AllocationState {
            program: ProgramId::new("program"),
            items_available: available,
            items_redeemed: redeemed,
            items_remaining: remaining,
            go_live_at: Utc.with_ymd_and_hms(2021, 11, 9, 18, 0, 0).unwrap(),
        }
    }

    #[test]
    fn scan__finds_codes_in_legacy_messages() {
        // given
        let message = "Transaction simulation failed: custom program error: 0x137";

        // when
        let codes = ProgramErrorCode::scan(message);

        // then
        assert_eq!(codes, vec![ProgramErrorCode::SUPPLY_EXHAUSTED]);
    }

    #[test]
    fn scan__ignores_bare_prefixes_and_overflowing_digits() {
        let codes = ProgramErrorCode::scan("0x then 0xffffffffffff and 0x1");
        assert_eq!(codes, vec![ProgramErrorCode(1)]);
    }

    #[test]
    fn allocation_state__flags_sold_out_and_inconsistent_counters() {
        assert!(state(10, 10, 0).is_sold_out());
        assert!(state(10, 10, 0).is_consistent());
        assert!(!state(10, 4, 5).is_consistent());
    }

    #[test]
    fn allocation_state__is_live_from_go_live_onwards() {
        let s = state(10, 0, 10);
        assert!(!s.is_live_at(s.go_live_at - chrono::Duration::seconds(1)));
        assert!(s.is_live_at(s.go_live_at));
    }

    #[test]
    fn commitment_level__parses_legacy_single_gossip_as_processed() {
        assert_eq!(
            "singleGossip".parse::<CommitmentLevel>(),
            Ok(CommitmentLevel::Processed)
        );
        assert!("eventually".parse::<CommitmentLevel>().is_err());
    }
}
