//! Credential sets and the base credential source chain.
//!
//! Base credentials come from one of two places, tried in order:
//!
//! 1. Static `aws-access-key-id` / `aws-secret-access-key` inputs
//! 2. Whatever the host already provides (environment, profile, task or
//!    instance role)
//!
//! Either way the result is read back through a [`CredentialLoader`], which
//! reports what the SDK will actually sign with.

use crate::config::ActionInputs;
use crate::{ActionError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// A set of AWS credentials.
///
/// Valid only when both the access key id and the secret are non-empty; see
/// [`CredentialSet::is_valid`]. `Debug` output never includes the secret
/// fields.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl CredentialSet {
    /// Creates a credential set without expiration.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
        }
    }

    /// Sets the expiration time.
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Returns true when both key fields are non-empty.
    pub fn is_valid(&self) -> bool {
        !self.access_key_id.is_empty() && !self.secret_access_key.is_empty()
    }
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let session_token = self.session_token.as_ref().map(|_| "** redacted **");
        f.debug_struct("CredentialSet")
            .field("access_key_id", &"** redacted **")
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token)
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Where the base credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Static action inputs
    ActionInputs,
    /// Credentials already present on the host
    Ambient,
}

/// Result of walking the credential source chain.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    /// Credentials the SDK will sign with
    pub credentials: CredentialSet,

    /// Which source produced them
    pub origin: CredentialOrigin,
}

/// Loads credentials the way the SDK sees them.
///
/// With `staged` credentials, the loader hands them to the SDK and returns
/// what the SDK reports back. Without, it runs the ambient provider chain.
#[async_trait]
pub trait CredentialLoader: Send + Sync {
    /// Loads credentials.
    ///
    /// # Errors
    ///
    /// Any error means no provider could produce credentials; the chain
    /// reports it as [`ActionError::CredentialsUnavailable`].
    async fn load(&self, staged: Option<&CredentialSet>) -> anyhow::Result<CredentialSet>;
}

/// Builds a credential set from static inputs, or declines when none are set.
///
/// # Errors
///
/// Returns [`ActionError::InvalidInputCombination`] when an access key id is
/// supplied without a secret access key. No remote service is touched.
pub fn from_action_inputs(inputs: &ActionInputs) -> Result<Option<CredentialSet>> {
    let Some(ref access_key_id) = inputs.access_key_id else {
        return Ok(None);
    };

    let secret_access_key = inputs.secret_access_key.as_ref().ok_or_else(|| {
        ActionError::InvalidInputCombination(
            "'aws-secret-access-key' must be provided if 'aws-access-key-id' is provided"
                .to_string(),
        )
    })?;

    Ok(Some(CredentialSet::new(
        access_key_id.clone(),
        secret_access_key.clone(),
        inputs.session_token.clone(),
    )))
}

/// Walks the credential source chain and validates the result.
///
/// # Errors
///
/// - [`ActionError::InvalidInputCombination`]: key id without secret
/// - [`ActionError::CredentialsUnavailable`]: no provider produced
///   credentials, or they came back empty
/// - [`ActionError::CredentialsInconsistent`]: the SDK loaded a different
///   key id than the one staged from inputs
pub async fn resolve(
    inputs: &ActionInputs,
    loader: &dyn CredentialLoader,
) -> Result<ResolvedCredentials> {
    let staged = from_action_inputs(inputs)?;
    let origin = if staged.is_some() {
        CredentialOrigin::ActionInputs
    } else {
        CredentialOrigin::Ambient
    };
    debug!(?origin, "Loading base credentials");

    let loaded = loader.load(staged.as_ref()).await.map_err(|e| {
        debug!("Credential loader failed: {e:#}");
        ActionError::CredentialsUnavailable(
            "Could not load credentials from any providers".to_string(),
        )
    })?;

    validate_loaded(staged.as_ref(), &loaded)?;

    info!(?origin, "Base credentials loaded");
    Ok(ResolvedCredentials {
        credentials: loaded,
        origin,
    })
}

fn validate_loaded(staged: Option<&CredentialSet>, loaded: &CredentialSet) -> Result<()> {
    if loaded.access_key_id.is_empty() {
        return Err(ActionError::CredentialsUnavailable(
            "Access key ID empty after loading credentials".to_string(),
        ));
    }

    if let Some(staged) = staged {
        if staged.access_key_id != loaded.access_key_id {
            return Err(ActionError::CredentialsInconsistent);
        }
    }

    if loaded.secret_access_key.is_empty() {
        return Err(ActionError::CredentialsUnavailable(
            "Secret access key empty after loading credentials".to_string(),
        ));
    }

    Ok(())
}
