use crate::{
    error::{
        GateViolation,
        RegistryError,
    },
    types::{
        AccountId,
        EligibilityRecord,
    },
};
use std::{
    fmt,
    future::Future,
};

/// Remote allowlist/reservation registry.
pub trait AllowlistRegistry {
    /// Remaining reserve count of `account`, or `None` if it is not listed.
    fn member(
        &self,
        account: &AccountId,
    ) -> impl Future<Output = Result<Option<i64>, RegistryError>> + Send;

    /// Overwrite the reserve count of `account`.
    fn update_reserve(
        &self,
        account: &AccountId,
        secret: &str,
        reserve: i64,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send;
}

/// Allowlist checks and the post-claim reserve write-back.
pub struct EligibilityGate<R> {
    registry: R,
    secret: String,
}

impl<R> fmt::Debug for EligibilityGate<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EligibilityGate")
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl<R: AllowlistRegistry> EligibilityGate<R> {
    pub fn new(registry: R, secret: impl Into<String>) -> Self {
        Self {
            registry,
            secret: secret.into(),
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub async fn lookup(
        &self,
        account: &AccountId,
    ) -> Result<Option<EligibilityRecord>, RegistryError> {
        let reserve = self.registry.member(account).await?;
        Ok(reserve.map(|reserve_count| EligibilityRecord {
            account: account.clone(),
            reserve_count,
        }))
    }

    /// Push `new_reserve_count` for `account`. This is an absolute write of a
    /// value computed from an earlier read, so two sessions of the same
    /// account can lose an update.
    pub async fn commit(
        &self,
        account: &AccountId,
        new_reserve_count: i64,
    ) -> Result<(), RegistryError> {
        self.registry
            .update_reserve(account, &self.secret, new_reserve_count)
            .await
    }
}

/// Reserve count to claim against, or why the account may not claim.
pub fn check(record: Option<&EligibilityRecord>) -> Result<i64, GateViolation> {
    let record = record.ok_or(GateViolation::NotEligible)?;
    if record.reserve_count < 1 {
        return Err(GateViolation::ReserveExhausted);
    }
    Ok(record.reserve_count)
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(reserve_count: i64) -> EligibilityRecord {
        EligibilityRecord {
            account: AccountId::new("alice"),
            reserve_count,
        }
    }

    #[test]
    fn check__rejects_unlisted_accounts() {
        assert_eq!(check(None), Err(GateViolation::NotEligible));
    }

    #[test]
    fn check__rejects_empty_or_negative_reserves() {
        assert_eq!(check(Some(&record(0))), Err(GateViolation::ReserveExhausted));
        assert_eq!(check(Some(&record(-3))), Err(GateViolation::ReserveExhausted));
        assert_eq!(
            check(Some(&record(i64::MIN))),
            Err(GateViolation::ReserveExhausted)
        );
    }

    #[test]
    fn check__passes_remaining_reserve_through() {
        assert_eq!(check(Some(&record(2))), Ok(2));
    }
}
