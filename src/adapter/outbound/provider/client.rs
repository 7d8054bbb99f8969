//! HTTP client for game provider APIs.
//!
//! Every request carries the partner's access token as a bearer header and an
//! HMAC signature over the operation code, username and timestamp. Transport
//! errors, timeouts and 5xx/408/429 responses surface as `ProviderUnavailable`
//! and may be retried by the caller; other 4xx responses, an unknown provider
//! and a balance for the wrong player surface as `ProviderRejected`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use super::dto::{BalanceResponse, HistoryResponse};
use super::settings::ProviderConfig;
use super::signing;
use crate::domain::{DomainError, ProviderCredential, ProviderId, SettledBet};
use crate::error::Result;
use crate::port::ProviderGateway;

struct Endpoint {
    http: HttpClient,
    config: ProviderConfig,
}

/// HTTP implementation of [`ProviderGateway`] covering every configured provider.
pub struct HttpProviderClient {
    endpoints: HashMap<ProviderId, Endpoint>,
}

impl HttpProviderClient {
    /// Build one HTTP client per configured provider.
    #[must_use]
    pub fn from_configs(configs: &[ProviderConfig]) -> Self {
        let endpoints = configs
            .iter()
            .map(|config| {
                let http = HttpClient::builder()
                    .timeout(Duration::from_millis(config.http.timeout_ms))
                    .connect_timeout(Duration::from_millis(config.http.connect_timeout_ms))
                    .build()
                    .unwrap_or_else(|err| {
                        warn!(provider = %config.id, error = %err, "Failed to build HTTP client, using defaults");
                        HttpClient::new()
                    });
                (
                    config.id.clone(),
                    Endpoint {
                        http,
                        config: config.clone(),
                    },
                )
            })
            .collect();
        Self { endpoints }
    }

    /// Providers this client can reach.
    pub fn providers(&self) -> impl Iterator<Item = &ProviderId> {
        self.endpoints.keys()
    }

    fn endpoint(&self, provider: &ProviderId) -> Result<&Endpoint> {
        self.endpoints.get(provider).ok_or_else(|| {
            rejected(provider, "provider not configured".to_string())
        })
    }

    async fn signed_get<T>(
        &self,
        provider: &ProviderId,
        url: &str,
        credential: &ProviderCredential,
        username: &str,
        extra: &[(&str, String)],
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let endpoint = self.endpoint(provider)?;
        let timestamp = Utc::now().timestamp_millis();
        let payload = signing::payload(&credential.operation_code, username, timestamp);
        let signature = signing::sign(&credential.signing_secret, &payload)
            .map_err(|e| rejected(provider, e.to_string()))?;

        let mut query: Vec<(&str, String)> = vec![
            ("operator", credential.operation_code.clone()),
            ("username", username.to_string()),
            ("timestamp", timestamp.to_string()),
            ("signature", signature),
        ];
        query.extend(extra.iter().cloned());

        debug!(provider = %provider, url = %url, "Calling provider");

        let response = endpoint
            .http
            .get(url)
            .bearer_auth(&credential.access_token)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .query(&query)
            .send()
            .await
            .map_err(|e| unavailable(provider, e.to_string()))?
            .error_for_status()
            .map_err(|e| status_failure(provider, &e))?;

        response
            .json::<T>()
            .await
            .map_err(|e| unavailable(provider, format!("malformed response: {e}")))
    }
}

fn unavailable(provider: &ProviderId, reason: String) -> crate::error::Error {
    DomainError::ProviderUnavailable {
        provider: provider.clone(),
        reason,
    }
    .into()
}

fn rejected(provider: &ProviderId, reason: String) -> crate::error::Error {
    DomainError::ProviderRejected {
        provider: provider.clone(),
        reason,
    }
    .into()
}

/// Only timeouts, throttling and server errors are worth another attempt.
fn status_failure(provider: &ProviderId, err: &reqwest::Error) -> crate::error::Error {
    match err.status() {
        Some(status)
            if status.is_client_error()
                && status != StatusCode::REQUEST_TIMEOUT
                && status != StatusCode::TOO_MANY_REQUESTS =>
        {
            rejected(provider, err.to_string())
        }
        _ => unavailable(provider, err.to_string()),
    }
}

#[async_trait]
impl ProviderGateway for HttpProviderClient {
    async fn fetch_balance(
        &self,
        provider: &ProviderId,
        credential: &ProviderCredential,
        username: &str,
    ) -> Result<Decimal> {
        let url = self.endpoint(provider)?.config.balance_url();
        let response: BalanceResponse = self
            .signed_get(provider, &url, credential, username, &[])
            .await?;
        if let Some(echoed) = response.username.as_deref() {
            if echoed != username {
                return Err(rejected(
                    provider,
                    format!("balance returned for '{echoed}', expected '{username}'"),
                ));
            }
        }
        Ok(response.balance)
    }

    async fn pull_settled(
        &self,
        provider: &ProviderId,
        credential: &ProviderCredential,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SettledBet>> {
        let url = self.endpoint(provider)?.config.history_url();
        let extra: Vec<(&str, String)> = since
            .map(|t| ("since", t.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .into_iter()
            .collect();
        let response: HistoryResponse = self
            .signed_get(provider, &url, credential, "", &extra)
            .await?;
        debug!(provider = %provider, count = response.bets.len(), "Pulled settled bets");
        Ok(response
            .bets
            .into_iter()
            .map(|bet| bet.into_domain(provider))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PartnerId;
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn credential() -> ProviderCredential {
        ProviderCredential {
            partner_id: PartnerId::new("top"),
            provider_id: ProviderId::new("evolution"),
            operation_code: "op-1".into(),
            access_token: "token".into(),
            signing_secret: "secret".into(),
            enabled: true,
        }
    }

    /// Serve one canned JSON response and hand back the raw request head.
    async fn serve_once(body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        serve_status("200 OK", body).await
    }

    async fn serve_status(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let client = HttpProviderClient::from_configs(&[]);
        let err = client
            .fetch_balance(&ProviderId::new("nope"), &credential(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::ProviderRejected { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn auth_failure_is_not_retryable() {
        let (base, _server) = serve_status("401 Unauthorized", "{}").await;
        let client = HttpProviderClient::from_configs(&[ProviderConfig::new("evolution", base)]);
        let err = client
            .fetch_balance(&ProviderId::new("evolution"), &credential(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::ProviderRejected { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_retryable() {
        let (base, _server) = serve_status("503 Service Unavailable", "{}").await;
        let client = HttpProviderClient::from_configs(&[ProviderConfig::new("evolution", base)]);
        let err = client
            .fetch_balance(&ProviderId::new("evolution"), &credential(), "alice")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fetch_balance_sends_signed_request() {
        let (base, server) = serve_once(r#"{"username":"alice","balance":"950.00"}"#).await;
        let client = HttpProviderClient::from_configs(&[ProviderConfig::new("evolution", base)]);

        let balance = client
            .fetch_balance(&ProviderId::new("evolution"), &credential(), "alice")
            .await
            .unwrap();
        assert_eq!(balance, dec!(950));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /balance?"));
        assert!(request.contains("operator=op-1"));
        assert!(request.contains("signature="));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer token"));
    }

    #[tokio::test]
    async fn mismatched_username_is_rejected() {
        let (base, _server) = serve_once(r#"{"username":"mallory","balance":"1"}"#).await;
        let client = HttpProviderClient::from_configs(&[ProviderConfig::new("evolution", base)]);
        let err = client
            .fetch_balance(&ProviderId::new("evolution"), &credential(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_domain(),
            Some(DomainError::ProviderRejected { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn pull_settled_maps_bets() {
        let (base, _server) = serve_once(
            r#"{"bets":[{"id":"b-1","username":"alice","stake":"5","payout":"0","settled_at":"2026-10-01T12:00:00Z"}]}"#,
        )
        .await;
        let client = HttpProviderClient::from_configs(&[ProviderConfig::new("evolution", base)]);
        let bets = client
            .pull_settled(&ProviderId::new("evolution"), &credential(), None)
            .await
            .unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].provider_id, ProviderId::new("evolution"));
        assert_eq!(bets[0].net(), dec!(-5));
    }
}
