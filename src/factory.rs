//! Remote service construction and provider registration.
//!
//! Everything that talks to the network is built through a
//! [`ServiceFactory`]. Provider modules register a constructor under a name
//! (`"aws"`, `"mock"`) and the binary picks one with [`new_services`].

use crate::credentials::CredentialLoader;
use crate::sts::StsApi;
use crate::token::IdentityTokenIssuer;
use crate::{ActionError, Result};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Builds the remote capabilities the action consumes.
pub trait ServiceFactory: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// STS client for a validated region.
    fn sts(&self, region: &str) -> Result<Box<dyn StsApi>>;

    /// Credential loader for a validated region.
    fn credential_loader(&self, region: &str) -> Result<Box<dyn CredentialLoader>>;

    /// OIDC token issuer for the runner's token endpoint.
    fn token_issuer(
        &self,
        request_url: &str,
        request_token: &str,
    ) -> Result<Box<dyn IdentityTokenIssuer>>;
}

/// Constructor stored in the registry.
pub type ServicesConstructor = fn() -> Result<Box<dyn ServiceFactory>>;

static PROVIDER_REGISTRY: OnceLock<RwLock<HashMap<String, ServicesConstructor>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, ServicesConstructor>> {
    PROVIDER_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a provider constructor.
///
/// Called from each provider module's `register()`.
pub fn register_services(provider: &str, constructor: ServicesConstructor) {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    reg.insert(provider.to_string(), constructor);
}

/// Builds the services of a registered provider.
///
/// # Errors
///
/// Returns an error if the provider is not registered (feature not compiled
/// in, or `register()` never called) or its constructor fails.
///
/// # Example
///
/// ```no_run
/// use aws_creds_action::{factory, providers};
///
/// providers::register_all();
/// let services = factory::new_services("aws")?;
/// assert_eq!(services.name(), "aws");
/// # Ok::<(), aws_creds_action::ActionError>(())
/// ```
pub fn new_services(provider: &str) -> Result<Box<dyn ServiceFactory>> {
    let constructor = {
        let reg = registry().read().unwrap_or_else(|e| e.into_inner());
        reg.get(provider).copied().ok_or_else(|| {
            ActionError::Other(anyhow::anyhow!(
                "unknown provider: {provider} (did you enable the '{provider}' feature flag?)"
            ))
        })?
    };

    constructor()
}
