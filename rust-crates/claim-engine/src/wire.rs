//! JSON bodies exchanged with the ledger gateway and the allowlist registry.

use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

/// `base` with `segments` appended, each percent-encoded as one path
/// segment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| format!("{base} cannot be used as a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `GET /programs/{program}/state`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStateDto {
    pub items_available: u64,
    pub items_redeemed: u64,
    pub items_remaining: u64,
    /// Unix seconds.
    pub go_live_at: i64,
}

/// Successful `POST /transactions`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitClaimResponse {
    pub tx: String,
}

/// Body of a refused `POST /transactions`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitClaimRejection {
    #[serde(default)]
    pub code: Option<u32>,
    pub message: String,
}

/// `GET /transactions/{tx}?commitment=..`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatusDto {
    Pending,
    Ok,
    ProgramError { code: u32 },
}

/// `GET /accounts/{account}/balance`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDto {
    pub balance: u64,
}

/// `GET /member/{account}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    #[serde(alias = "reserveCount")]
    pub reserve: i64,
}

/// Body of `PUT /update/{account}/{secret}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveUpdateDto {
    pub reserve: i64,
}

/// Error body used by the registry, e.g. `{"detail": "No wallet found"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetailDto {
    pub detail: String,
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint__encodes_reserved_characters_per_segment() {
        // given
        let base = Url::parse("http://registry.local/api/").unwrap();

        // when
        let url = endpoint(&base, &["update", "alice", "ab/c#d?e%f"]).unwrap();

        // then
        assert_eq!(
            url.as_str(),
            "http://registry.local/api/update/alice/ab%2Fc%23d%3Fe%25f"
        );
        assert_eq!(url.path_segments().map(|s| s.count()), Some(4));
    }

    #[test]
    fn endpoint__appends_to_bare_host() {
        let base = Url::parse("http://127.0.0.1:8899").unwrap();

        let url = endpoint(&base, &["transactions", "tx-1"]).unwrap();

        assert_eq!(url.as_str(), "http://127.0.0.1:8899/transactions/tx-1");
    }

    #[test]
    fn member_dto__accepts_camel_case_reserve_count() {
        let dto: MemberDto = serde_json::from_str(r#"{"reserveCount": 2}"#).unwrap();
        assert_eq!(dto.reserve, 2);
        let dto: MemberDto = serde_json::from_str(r#"{"reserve": 0}"#).unwrap();
        assert_eq!(dto.reserve, 0);
    }

    #[test]
    fn transaction_status_dto__uses_status_tag() {
        let dto: TransactionStatusDto =
            serde_json::from_str(r#"{"status": "program_error", "code": 311}"#).unwrap();
        assert_eq!(dto, TransactionStatusDto::ProgramError { code: 311 });
        assert_eq!(
            serde_json::to_string(&TransactionStatusDto::Pending).unwrap(),
            r#"{"status":"pending"}"#
        );
    }
}
