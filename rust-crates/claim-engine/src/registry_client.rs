use crate::{
    eligibility::AllowlistRegistry,
    error::RegistryError,
    types::AccountId,
    wire::{
        MemberDto,
        ReserveUpdateDto,
        endpoint,
    },
};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client of the allowlist registry.
#[derive(Clone, Debug)]
pub struct HttpRegistry {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpRegistry {
    pub fn new(base_url: Url) -> Result<Self, RegistryError> {
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                RegistryError::Network(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        endpoint(&self.base_url, segments).map_err(RegistryError::InvalidUrl)
    }
}

impl AllowlistRegistry for HttpRegistry {
    async fn member(&self, account: &AccountId) -> Result<Option<i64>, RegistryError> {
        let url = self.url(&["member", account.as_str()])?;
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        if res.status() == StatusCode::NOT_FOUND {
            debug!(%account, "account not on allowlist");
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(RegistryError::Network(format!(
                "registry responded with {} when looking up {account}",
                res.status()
            )));
        }
        let dto: MemberDto = res
            .json()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;
        Ok(Some(dto.reserve))
    }

    async fn update_reserve(
        &self,
        account: &AccountId,
        secret: &str,
        reserve: i64,
    ) -> Result<(), RegistryError> {
        // the registry expects the shared secret as a path segment
        let url = self.url(&["update", account.as_str(), secret])?;
        let res = self
            .http
            .put(url)
            .json(&ReserveUpdateDto { reserve })
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;
        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RegistryError::Auth(format!(
                "registry responded with {status}"
            )));
        }
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(RegistryError::Network(format!(
                "registry responded with {status} when updating {account}: {body}"
            )));
        }
        Ok(())
    }
}
