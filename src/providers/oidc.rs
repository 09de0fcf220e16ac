//! GitHub Actions OIDC token issuer.

use crate::token::IdentityTokenIssuer;
use crate::{ActionError, Result};
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    value: Option<String>,
}

/// Fetches ID tokens from the runner's token endpoint.
///
/// The endpoint URL and its bearer token come from
/// `ACTIONS_ID_TOKEN_REQUEST_URL` and `ACTIONS_ID_TOKEN_REQUEST_TOKEN`,
/// which the runner sets only for jobs granted `id-token: write`.
pub struct OidcTokenIssuer {
    client: Client,
    request_url: Url,
    request_token: String,
}

impl OidcTokenIssuer {
    /// Creates an issuer for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or the HTTP client cannot
    /// be built.
    pub fn new(request_url: &str, request_token: &str) -> Result<Self> {
        let request_url = Url::parse(request_url).map_err(|e| {
            ActionError::TokenUnavailable(format!("Invalid ID token request URL: {e}"))
        })?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ActionError::Other(e.into()))?;

        Ok(Self {
            client,
            request_url,
            request_token: request_token.to_string(),
        })
    }

    fn token_url(&self, audience: &str) -> Url {
        let mut url = self.request_url.clone();
        url.query_pairs_mut().append_pair("audience", audience);
        url
    }
}

impl std::fmt::Debug for OidcTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcTokenIssuer")
            .field("request_url", &self.request_url.as_str())
            .field("request_token", &"** redacted **")
            .finish()
    }
}

#[async_trait]
impl IdentityTokenIssuer for OidcTokenIssuer {
    async fn fetch(&self, audience: &str) -> anyhow::Result<String> {
        let url = self.token_url(audience);
        debug!(
            host = url.host_str().unwrap_or_default(),
            "Requesting ID token"
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.request_token)
            .header(reqwest::header::ACCEPT, "application/json; api-version=2.0")
            .send()
            .await
            .context("Failed to request ID token")?;

        if !response.status().is_success() {
            bail!(
                "Failed to get ID Token. Response status: {}",
                response.status()
            );
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse ID token response")?;

        match body.value {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("Response json body do not have ID Token field"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::STS_AUDIENCE;

    #[test]
    fn test_audience_is_appended() {
        let issuer = OidcTokenIssuer::new(
            "https://pipelines.actions.example/idtoken?api-version=2.0",
            "request-token",
        )
        .unwrap();

        assert_eq!(
            issuer.token_url(STS_AUDIENCE).as_str(),
            "https://pipelines.actions.example/idtoken?api-version=2.0&audience=sts.amazonaws.com"
        );
    }

    #[test]
    fn test_invalid_url() {
        let err = OidcTokenIssuer::new("not a url", "request-token").unwrap_err();
        assert!(err.to_string().starts_with("Invalid ID token request URL"));
    }

    #[test]
    fn test_debug_hides_request_token() {
        let issuer = OidcTokenIssuer::new("https://token.example/", "SUPERSECRET").unwrap();
        assert!(!format!("{issuer:?}").contains("SUPERSECRET"));
    }

    #[test]
    fn test_response_shape() {
        let body: TokenResponse = serde_json::from_str(r#"{"count":1,"value":"eyJ.jwt"}"#).unwrap();
        assert_eq!(body.value.as_deref(), Some("eyJ.jwt"));
    }
}
