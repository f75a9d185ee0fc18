use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GatewaySettings;
use crate::error::{AppError, Result};
use crate::models::Gateway;
use crate::observability::mask_sensitive;

/// Normalised outcome of a gateway verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    /// Provider status string, kept for diagnostics.
    pub status: String,
    /// Charged amount in minor units.
    pub amount: i64,
}

impl VerificationResult {
    pub fn successful(amount: i64) -> Self {
        Self {
            success: true,
            status: "success".to_string(),
            amount,
        }
    }

    pub fn failed(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
            amount: 0,
        }
    }
}

/// Confirms with a payment provider that a client-reported charge succeeded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GatewayVerifier: Send + Sync {
    /// Transport failures surface as `VerificationFailed` with the upstream message.
    async fn verify(&self, reference: &str) -> Result<VerificationResult>;
}

/// Selects the verifier for a gateway.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    verifiers: HashMap<Gateway, Arc<dyn GatewayVerifier>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Gateway, verifier: Arc<dyn GatewayVerifier>) -> Self {
        self.verifiers.insert(gateway, verifier);
        self
    }

    /// Builds HTTP verifiers for both gateways from configuration.
    pub fn from_settings(a: &GatewaySettings, b: &GatewaySettings) -> Result<Self> {
        Ok(Self::new()
            .with(Gateway::A, Arc::new(HttpGatewayVerifier::new(Gateway::A, a)?))
            .with(Gateway::B, Arc::new(HttpGatewayVerifier::new(Gateway::B, b)?)))
    }

    pub async fn verify(&self, gateway: Gateway, reference: &str) -> Result<VerificationResult> {
        let verifier = self.verifiers.get(&gateway).ok_or_else(|| {
            AppError::VerificationFailed(format!("no verifier configured for gateway {}", gateway.as_str()))
        })?;
        verifier.verify(reference).await
    }
}

#[derive(Debug, Deserialize)]
struct GatewayAResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<GatewayAData>,
}

#[derive(Debug, Deserialize)]
struct GatewayAData {
    transaction_status: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct GatewayBResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<GatewayBData>,
}

#[derive(Debug, Deserialize)]
struct GatewayBData {
    status: String,
    amount: i64,
}

/// Maps a provider-specific verification body onto [`VerificationResult`].
pub fn parse_verification(gateway: Gateway, body: &[u8]) -> Result<VerificationResult> {
    let malformed =
        |e: serde_json::Error| AppError::VerificationFailed(format!("malformed gateway {} response: {}", gateway.as_str(), e));

    match gateway {
        Gateway::A => {
            let response: GatewayAResponse = serde_json::from_slice(body).map_err(malformed)?;
            Ok(match response.data {
                Some(data) => VerificationResult {
                    success: response.success && data.transaction_status == "success",
                    status: data.transaction_status,
                    amount: data.amount,
                },
                None => VerificationResult::failed(response.message.unwrap_or_else(|| "unknown".to_string())),
            })
        }
        Gateway::B => {
            let response: GatewayBResponse = serde_json::from_slice(body).map_err(malformed)?;
            Ok(match response.data {
                Some(data) => VerificationResult {
                    success: response.status == "success" && data.status == "successful",
                    status: data.status,
                    amount: data.amount,
                },
                None => VerificationResult::failed(response.message.unwrap_or(response.status)),
            })
        }
    }
}

/// Verifier calling `GET {base_url}/verify/{reference}` with a bearer token.
pub struct HttpGatewayVerifier {
    gateway: Gateway,
    client: reqwest::Client,
    base_url: reqwest::Url,
    secret_key: String,
}

impl HttpGatewayVerifier {
    pub fn new(gateway: Gateway, settings: &GatewaySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;
        let base_url = reqwest::Url::parse(&settings.base_url).map_err(|e| {
            AppError::Validation(format!("invalid gateway {} base_url: {}", gateway.as_str(), e))
        })?;

        Ok(Self {
            gateway,
            client,
            base_url,
            secret_key: settings.secret_key.clone(),
        })
    }

    fn verify_url(&self, reference: &str) -> Result<reqwest::Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::VerificationFailed("gateway base_url cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("verify")
            .push(reference);
        Ok(url)
    }
}

#[async_trait]
impl GatewayVerifier for HttpGatewayVerifier {
    async fn verify(&self, reference: &str) -> Result<VerificationResult> {
        let url = self.verify_url(reference)?;
        debug!(gateway = self.gateway.as_str(), reference = %mask_sensitive(reference, 4), "Verifying payment");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                warn!(gateway = self.gateway.as_str(), error = %e, "Gateway request failed");
                AppError::VerificationFailed(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::VerificationFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(AppError::VerificationFailed(format!(
                "gateway {} responded {}: {}",
                self.gateway.as_str(),
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        parse_verification(self.gateway, &body)
    }
}
