//! AWS SDK implementations of the remote seams.
//!
//! STS calls go through `aws-sdk-sts` with SDK retries disabled; the action
//! runs its own retry policy around role assumption. Credential loading goes
//! through `aws-config`'s default provider chain.
//!
//! # Endpoint override
//!
//! `AWS_ENDPOINT_URL_STS` points every STS call at a custom endpoint (for
//! example a local emulator).

use crate::config::inputs;
use crate::credentials::{CredentialLoader, CredentialSet};
use crate::factory::ServiceFactory;
use crate::providers::oidc::OidcTokenIssuer;
use crate::sts::{CallerIdentity, CredentialRequest, StsApi, TokenRequest};
use crate::token::IdentityTokenIssuer;
use crate::{ActionError, Result};
use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::Region;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_credential_types::Credentials;
use aws_sdk_sts::config::retry::RetryConfig;
use aws_sdk_sts::config::{BehaviorVersion, Config as StsConfig};
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::types::Tag;
use aws_sdk_sts::Client as StsClient;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Environment variable overriding the STS endpoint.
pub const STS_ENDPOINT_ENV: &str = "AWS_ENDPOINT_URL_STS";

const PROVIDER_NAME: &str = "aws-creds-action";

/// STS client backed by `aws-sdk-sts`.
///
/// A fresh SDK client is built per call so each call signs with exactly the
/// credentials it was given.
#[derive(Debug, Clone)]
pub struct SdkStsClient {
    region: String,
    endpoint: Option<String>,
}

impl SdkStsClient {
    pub fn new(region: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            region: region.into(),
            endpoint,
        }
    }

    fn client(&self, credentials: Option<&CredentialSet>) -> StsClient {
        let mut builder = StsConfig::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()))
            .retry_config(RetryConfig::disabled());

        if let Some(credentials) = credentials {
            builder = builder.credentials_provider(to_sdk_credentials(credentials));
        }

        if let Some(ref endpoint) = self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        StsClient::from_conf(builder.build())
    }
}

#[async_trait]
impl StsApi for SdkStsClient {
    async fn get_caller_identity(&self, credentials: &CredentialSet) -> Result<CallerIdentity> {
        let response = self
            .client(Some(credentials))
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| ActionError::remote("GetCallerIdentity", DisplayErrorContext(&e)))?;

        let account = response.account().ok_or_else(|| {
            ActionError::remote("GetCallerIdentity", "Could not get Account ID from STS")
        })?;

        Ok(CallerIdentity {
            account: account.to_string(),
            arn: response.arn().unwrap_or_default().to_string(),
        })
    }

    async fn assume_role(&self, request: &CredentialRequest) -> Result<CredentialSet> {
        let tags = request
            .tags
            .as_ref()
            .map(|tags| {
                tags.iter()
                    .map(|tag| {
                        Tag::builder()
                            .key(&tag.key)
                            .value(&tag.value)
                            .build()
                            .map_err(|e| ActionError::remote("AssumeRole", e))
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        let duration_seconds = duration(request.duration_seconds)?;

        let response = self
            .client(Some(&request.credentials))
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(duration_seconds)
            .set_external_id(request.external_id.clone())
            .set_tags(tags)
            .send()
            .await
            .map_err(|e| ActionError::remote("AssumeRole", DisplayErrorContext(&e)))?;

        let credentials = response
            .credentials()
            .ok_or_else(|| ActionError::remote("AssumeRole", "STS returned no credentials"))?;

        Ok(from_sts_credentials(credentials))
    }

    async fn assume_role_with_web_identity(
        &self,
        request: &TokenRequest,
    ) -> Result<CredentialSet> {
        let duration_seconds = duration(request.duration_seconds)?;

        let response = self
            .client(None)
            .assume_role_with_web_identity()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(duration_seconds)
            .web_identity_token(request.identity_token.as_str())
            .send()
            .await
            .map_err(|e| {
                ActionError::remote("AssumeRoleWithWebIdentity", DisplayErrorContext(&e))
            })?;

        let credentials = response.credentials().ok_or_else(|| {
            ActionError::remote("AssumeRoleWithWebIdentity", "STS returned no credentials")
        })?;

        Ok(from_sts_credentials(credentials))
    }
}

fn duration(seconds: u32) -> Result<i32> {
    i32::try_from(seconds).map_err(|_| ActionError::InvalidInput {
        name: inputs::ROLE_DURATION_SECONDS.to_string(),
        value: seconds.to_string(),
    })
}

fn to_sdk_credentials(credentials: &CredentialSet) -> Credentials {
    Credentials::new(
        credentials.access_key_id.clone(),
        credentials.secret_access_key.clone(),
        credentials.session_token.clone(),
        credentials.expiration.map(Into::into),
        PROVIDER_NAME,
    )
}

fn from_sts_credentials(credentials: &aws_sdk_sts::types::Credentials) -> CredentialSet {
    let expiration = credentials.expiration();
    let set = CredentialSet::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        Some(credentials.session_token().to_string()),
    );

    match DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos()) {
        Some(expiration) => set.with_expiration(expiration),
        None => set,
    }
}

fn from_loaded_credentials(credentials: &Credentials) -> CredentialSet {
    let set = CredentialSet::new(
        credentials.access_key_id(),
        credentials.secret_access_key(),
        credentials.session_token().map(str::to_string),
    );

    match credentials.expiry() {
        Some(expiry) => set.with_expiration(DateTime::<Utc>::from(expiry)),
        None => set,
    }
}

/// Credential loader backed by `aws-config`.
#[derive(Debug, Clone)]
pub struct SdkCredentialLoader {
    region: String,
}

impl SdkCredentialLoader {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

#[async_trait]
impl CredentialLoader for SdkCredentialLoader {
    async fn load(&self, staged: Option<&CredentialSet>) -> anyhow::Result<CredentialSet> {
        let loaded = match staged {
            Some(staged) => {
                debug!("Reading staged credentials back through the SDK");
                SharedCredentialsProvider::new(to_sdk_credentials(staged))
                    .provide_credentials()
                    .await?
            }
            None => {
                debug!("Running the default credential provider chain");
                DefaultCredentialsChain::builder()
                    .region(Region::new(self.region.clone()))
                    .build()
                    .await
                    .provide_credentials()
                    .await?
            }
        };

        Ok(from_loaded_credentials(&loaded))
    }
}

/// Production services: AWS SDK for STS and credentials, reqwest for OIDC.
#[derive(Debug, Clone, Default)]
pub struct SdkServices {
    endpoint: Option<String>,
}

impl SdkServices {
    /// Reads the optional endpoint override from the environment.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var(STS_ENDPOINT_ENV)
                .ok()
                .filter(|endpoint| !endpoint.trim().is_empty()),
        }
    }

    /// Sends every STS call to `endpoint`.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

impl ServiceFactory for SdkServices {
    fn name(&self) -> &str {
        "aws"
    }

    fn sts(&self, region: &str) -> Result<Box<dyn StsApi>> {
        Ok(Box::new(SdkStsClient::new(region, self.endpoint.clone())))
    }

    fn credential_loader(&self, region: &str) -> Result<Box<dyn CredentialLoader>> {
        Ok(Box::new(SdkCredentialLoader::new(region)))
    }

    fn token_issuer(
        &self,
        request_url: &str,
        request_token: &str,
    ) -> Result<Box<dyn IdentityTokenIssuer>> {
        Ok(Box::new(OidcTokenIssuer::new(request_url, request_token)?))
    }
}

/// Registers the AWS services with the factory.
pub fn register() {
    crate::factory::register_services("aws", || Ok(Box::new(SdkServices::from_env())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_sts_credentials_conversion() {
        let sts = aws_sdk_sts::types::Credentials::builder()
            .access_key_id("ROLE-KEY")
            .secret_access_key("ROLE-SECRET")
            .session_token("ROLE-TOKEN")
            .expiration(aws_sdk_sts::primitives::DateTime::from_secs(1_700_000_000))
            .build()
            .unwrap();

        let set = from_sts_credentials(&sts);

        assert_eq!(set.access_key_id, "ROLE-KEY");
        assert_eq!(set.session_token.as_deref(), Some("ROLE-TOKEN"));
        assert_eq!(set.expiration.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_loaded_credentials_conversion() {
        let expiry = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let sdk = Credentials::new("AKID", "SECRET", None, Some(expiry), "test");

        let set = from_loaded_credentials(&sdk);

        assert_eq!(set.access_key_id, "AKID");
        assert_eq!(set.session_token, None);
        assert_eq!(set.expiration.unwrap().timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_staged_credentials_read_back() {
        let staged = CredentialSet::new("AKID", "SECRET", Some("TOKEN".to_string()));
        let loader = SdkCredentialLoader::new("us-east-1");

        let loaded = loader.load(Some(&staged)).await.unwrap();

        assert_eq!(loaded, staged);
    }

    #[test]
    fn test_factory_builds_services() {
        let services = SdkServices::default().with_endpoint("http://localhost:4566");

        assert_eq!(services.name(), "aws");
        assert!(services.sts("us-east-1").is_ok());
        assert!(services.credential_loader("us-east-1").is_ok());
    }

    #[test]
    fn test_duration_conversion() {
        assert_eq!(duration(3600).unwrap(), 3600);
        assert_eq!(duration(2_147_483_647).unwrap(), i32::MAX);

        let err = duration(u32::MAX).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for input 'role-duration-seconds': 4294967295"
        );
    }
}
