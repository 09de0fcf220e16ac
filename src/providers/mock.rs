//! In-memory doubles for every seam.
//!
//! These let the whole action run without a runner or network access, with
//! error injection to simulate remote failures. Handles are cheap clones
//! sharing state, so a test can keep one and hand another to the action.
//!
//! # Example
//!
//! ```
//! use aws_creds_action::action::Action;
//! use aws_creds_action::credentials::CredentialSet;
//! use aws_creds_action::providers::mock::{InstantSleep, MemoryRunner, MockServices};
//!
//! #[tokio::main]
//! async fn main() -> aws_creds_action::Result<()> {
//!     let runner = MemoryRunner::new()
//!         .with_input("aws-region", "us-east-1")
//!         .with_input("aws-access-key-id", "AKID")
//!         .with_input("aws-secret-access-key", "SECRET");
//!     let services = MockServices::new();
//!
//!     Action::new(&runner, &runner, &services)
//!         .with_sleep(InstantSleep::new().shared())
//!         .run()
//!         .await?;
//!
//!     assert_eq!(runner.variable("AWS_ACCESS_KEY_ID").as_deref(), Some("AKID"));
//!     Ok(())
//! }
//! ```

use crate::credentials::{CredentialLoader, CredentialSet};
use crate::factory::ServiceFactory;
use crate::runner::{ExportSink, InputSource};
use crate::sts::{AssumptionRequest, CallerIdentity, CredentialRequest, StsApi, TokenRequest};
use crate::token::IdentityTokenIssuer;
use crate::{ActionError, Result};
use async_trait::async_trait;
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep, Sleep};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Account id the mock STS reports for unknown access keys.
pub const DEFAULT_ACCOUNT_ID: &str = "123456789012";

/// One call received by [`MemoryRunner`] as an [`ExportSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Secret(String),
    Variable(String, String),
    Output(String, String),
    Failed(String),
    Detail(String),
}

/// Runner double holding inputs and environment in memory.
#[derive(Default)]
pub struct MemoryRunner {
    inputs: HashMap<String, String>,
    env: HashMap<String, String>,
    events: Mutex<Vec<SinkEvent>>,

    /// Error returned from every publish call (`export_variable`, `set_output`)
    pub export_error: Option<String>,
}

impl MemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an action input.
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Sets an environment variable.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Every sink call so far, in order.
    pub fn events(&self) -> Vec<SinkEvent> {
        lock(&self.events).clone()
    }

    /// Values registered for masking, in order.
    pub fn secrets(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Secret(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Published variables, in order.
    pub fn variables(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Variable(name, value) => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    /// Published outputs, in order.
    pub fn outputs(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Output(name, value) => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    /// Last published value of a variable.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables()
            .into_iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// The failure message, if the run failed.
    pub fn failure(&self) -> Option<String> {
        self.events().into_iter().find_map(|event| match event {
            SinkEvent::Failed(message) => Some(message),
            _ => None,
        })
    }

    fn record(&self, event: SinkEvent) {
        lock(&self.events).push(event);
    }

    fn publish(&self, event: SinkEvent) -> Result<()> {
        if let Some(ref err) = self.export_error {
            return Err(ActionError::Other(anyhow::anyhow!("{err}")));
        }
        self.record(event);
        Ok(())
    }
}

fn present(map: &HashMap<String, String>, name: &str) -> Option<String> {
    map.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl InputSource for MemoryRunner {
    fn input(&self, name: &str) -> Option<String> {
        present(&self.inputs, name)
    }

    fn env(&self, name: &str) -> Option<String> {
        present(&self.env, name)
    }
}

impl ExportSink for MemoryRunner {
    fn set_secret(&self, value: &str) -> Result<()> {
        self.record(SinkEvent::Secret(value.to_string()));
        Ok(())
    }

    fn export_variable(&self, name: &str, value: &str) -> Result<()> {
        self.publish(SinkEvent::Variable(name.to_string(), value.to_string()))
    }

    fn set_output(&self, name: &str, value: &str) -> Result<()> {
        self.publish(SinkEvent::Output(name.to_string(), value.to_string()))
    }

    fn set_failed(&self, message: &str) {
        self.record(SinkEvent::Failed(message.to_string()));
    }

    fn error_detail(&self, detail: &str) {
        self.record(SinkEvent::Detail(detail.to_string()));
    }
}

#[derive(Default)]
struct StsState {
    identities: HashMap<String, CallerIdentity>,
    role_credentials: Option<CredentialSet>,
    assume_failures: u32,
    assume_calls: Vec<AssumptionRequest>,
    identity_calls: Vec<String>,
    identity_error: Option<String>,
}

/// STS double.
///
/// `get_caller_identity` answers from a table keyed by access key id,
/// falling back to [`DEFAULT_ACCOUNT_ID`]. Assumption returns fixed role
/// credentials after failing a configurable number of times.
#[derive(Clone, Default)]
pub struct MockSts {
    state: Arc<Mutex<StsState>>,
}

impl MockSts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps an access key id to the account owning it.
    pub fn with_identity(self, access_key_id: &str, account: &str, arn: &str) -> Self {
        lock(&self.state).identities.insert(
            access_key_id.to_string(),
            CallerIdentity {
                account: account.to_string(),
                arn: arn.to_string(),
            },
        );
        self
    }

    /// Credentials returned by both assumption operations.
    pub fn with_role_credentials(self, credentials: CredentialSet) -> Self {
        lock(&self.state).role_credentials = Some(credentials);
        self
    }

    /// Fails the first `failures` assumption calls. `u32::MAX` fails all.
    pub fn failing_assumptions(self, failures: u32) -> Self {
        lock(&self.state).assume_failures = failures;
        self
    }

    /// Fails every identity lookup.
    pub fn failing_identity(self, message: &str) -> Self {
        lock(&self.state).identity_error = Some(message.to_string());
        self
    }

    /// Assumption requests received, in order.
    pub fn assume_calls(&self) -> Vec<AssumptionRequest> {
        lock(&self.state).assume_calls.clone()
    }

    /// Access key ids passed to `get_caller_identity`, in order.
    pub fn identity_calls(&self) -> Vec<String> {
        lock(&self.state).identity_calls.clone()
    }

    /// Total remote calls received.
    pub fn call_count(&self) -> usize {
        let state = lock(&self.state);
        state.assume_calls.len() + state.identity_calls.len()
    }

    fn assume(&self, request: AssumptionRequest) -> Result<CredentialSet> {
        let mut state = lock(&self.state);
        let operation = request.operation();
        state.assume_calls.push(request);

        if state.assume_calls.len() as u64 <= u64::from(state.assume_failures) {
            return Err(ActionError::remote(operation, "Throttling: Rate exceeded"));
        }

        Ok(state.role_credentials.clone().unwrap_or_else(|| {
            CredentialSet::new(
                "ROLE-ACCESS-KEY-ID",
                "ROLE-SECRET-ACCESS-KEY",
                Some("ROLE-SESSION-TOKEN".to_string()),
            )
        }))
    }
}

#[async_trait]
impl StsApi for MockSts {
    async fn get_caller_identity(&self, credentials: &CredentialSet) -> Result<CallerIdentity> {
        let mut state = lock(&self.state);
        state.identity_calls.push(credentials.access_key_id.clone());

        if let Some(ref err) = state.identity_error {
            return Err(ActionError::remote("GetCallerIdentity", err));
        }

        Ok(state
            .identities
            .get(&credentials.access_key_id)
            .cloned()
            .unwrap_or_else(|| CallerIdentity {
                account: DEFAULT_ACCOUNT_ID.to_string(),
                arn: format!("arn:aws:iam::{DEFAULT_ACCOUNT_ID}:user/mock"),
            }))
    }

    async fn assume_role(&self, request: &CredentialRequest) -> Result<CredentialSet> {
        self.assume(AssumptionRequest::Credentials(request.clone()))
    }

    async fn assume_role_with_web_identity(
        &self,
        request: &TokenRequest,
    ) -> Result<CredentialSet> {
        self.assume(AssumptionRequest::WebIdentity(request.clone()))
    }
}

/// Credential loader double.
///
/// Echoes staged credentials, or returns the configured ambient set.
#[derive(Clone, Default)]
pub struct MockCredentialLoader {
    ambient: Option<CredentialSet>,
    loaded_override: Option<CredentialSet>,
    calls: Arc<AtomicUsize>,
}

impl MockCredentialLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials present on the host.
    pub fn with_ambient(mut self, credentials: CredentialSet) -> Self {
        self.ambient = Some(credentials);
        self
    }

    /// Returns these instead of the staged credentials.
    pub fn with_loaded_override(mut self, credentials: CredentialSet) -> Self {
        self.loaded_override = Some(credentials);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialLoader for MockCredentialLoader {
    async fn load(&self, staged: Option<&CredentialSet>) -> anyhow::Result<CredentialSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(ref credentials) = self.loaded_override {
            return Ok(credentials.clone());
        }

        match (staged, &self.ambient) {
            (Some(staged), _) => Ok(staged.clone()),
            (None, Some(ambient)) => Ok(ambient.clone()),
            (None, None) => anyhow::bail!("No credential providers in chain"),
        }
    }
}

/// OIDC issuer double.
#[derive(Clone, Default)]
pub struct MockTokenIssuer {
    token: Option<String>,
    audiences: Arc<Mutex<Vec<String>>>,
}

impl MockTokenIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token returned from `fetch`. Without one, `fetch` fails.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Audiences requested so far.
    pub fn audiences(&self) -> Vec<String> {
        lock(&self.audiences).clone()
    }
}

#[async_trait]
impl IdentityTokenIssuer for MockTokenIssuer {
    async fn fetch(&self, audience: &str) -> anyhow::Result<String> {
        lock(&self.audiences).push(audience.to_string());
        self.token
            .clone()
            .ok_or_else(|| {
                anyhow::anyhow!("Unable to get ACTIONS_ID_TOKEN_REQUEST_URL env variable")
            })
    }
}

/// Service factory handing out the mocks above.
#[derive(Clone, Default)]
pub struct MockServices {
    pub sts: MockSts,
    pub loader: MockCredentialLoader,
    pub issuer: MockTokenIssuer,
    regions: Arc<Mutex<Vec<String>>>,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sts(mut self, sts: MockSts) -> Self {
        self.sts = sts;
        self
    }

    pub fn with_loader(mut self, loader: MockCredentialLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_issuer(mut self, issuer: MockTokenIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    /// Regions services were built for.
    pub fn regions(&self) -> Vec<String> {
        lock(&self.regions).clone()
    }
}

impl ServiceFactory for MockServices {
    fn name(&self) -> &str {
        "mock"
    }

    fn sts(&self, region: &str) -> Result<Box<dyn StsApi>> {
        lock(&self.regions).push(region.to_string());
        Ok(Box::new(self.sts.clone()))
    }

    fn credential_loader(&self, _region: &str) -> Result<Box<dyn CredentialLoader>> {
        Ok(Box::new(self.loader.clone()))
    }

    fn token_issuer(
        &self,
        _request_url: &str,
        _request_token: &str,
    ) -> Result<Box<dyn IdentityTokenIssuer>> {
        Ok(Box::new(self.issuer.clone()))
    }
}

/// Sleep that completes immediately and counts its calls.
#[derive(Debug, Clone, Default)]
pub struct InstantSleep {
    calls: Arc<AtomicUsize>,
}

impl InstantSleep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of waits requested.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A shared handle for [`Action::with_sleep`](crate::action::Action::with_sleep).
    pub fn shared(&self) -> SharedAsyncSleep {
        SharedAsyncSleep::new(self.clone())
    }
}

impl AsyncSleep for InstantSleep {
    fn sleep(&self, _duration: Duration) -> Sleep {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Sleep::new(Box::pin(async move {}))
    }
}

/// Registers the mock services with the factory.
pub fn register() {
    crate::factory::register_services("mock", || Ok(Box::new(MockServices::new())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sts::IdentityToken;

    #[tokio::test]
    async fn test_identity_table() {
        let arn = "arn:aws:iam::111111111111:user/ci";
        let sts = MockSts::new().with_identity("AKID", "111111111111", arn);
        let handle = sts.clone();

        let known = sts
            .get_caller_identity(&CredentialSet::new("AKID", "SECRET", None))
            .await
            .unwrap();
        let unknown = sts
            .get_caller_identity(&CredentialSet::new("OTHER", "SECRET", None))
            .await
            .unwrap();

        assert_eq!(known.account, "111111111111");
        assert_eq!(unknown.account, DEFAULT_ACCOUNT_ID);
        assert_eq!(handle.identity_calls(), ["AKID", "OTHER"]);
    }

    #[tokio::test]
    async fn test_assumption_error_injection() {
        let sts = MockSts::new().failing_assumptions(1);
        let request = TokenRequest {
            role_arn: "arn:aws:iam::111111111111:role/MY-ROLE".to_string(),
            session_name: "GitHubActions".to_string(),
            duration_seconds: 3600,
            identity_token: IdentityToken::new("token"),
        };

        assert!(sts.assume_role_with_web_identity(&request).await.is_err());
        let credentials = sts.assume_role_with_web_identity(&request).await.unwrap();

        assert_eq!(credentials.access_key_id, "ROLE-ACCESS-KEY-ID");
        assert_eq!(sts.assume_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_loader_echoes_staged() {
        let loader = MockCredentialLoader::new();
        let staged = CredentialSet::new("AKID", "SECRET", None);

        assert_eq!(loader.load(Some(&staged)).await.unwrap(), staged);
        assert!(loader.load(None).await.is_err());
        assert_eq!(loader.call_count(), 2);
    }

    #[test]
    fn test_runner_export_error_injection() {
        let mut runner = MemoryRunner::new();
        runner.export_error = Some("disk full".to_string());

        assert!(runner.export_variable("AWS_REGION", "us-east-1").is_err());
        assert!(runner.set_secret("value").is_ok());
        assert_eq!(runner.events(), [SinkEvent::Secret("value".to_string())]);
    }

    #[test]
    fn test_blank_inputs_are_absent() {
        let runner = MemoryRunner::new()
            .with_input("aws-region", "  ")
            .with_env("GITHUB_SHA", "abc");

        assert_eq!(runner.input("aws-region"), None);
        assert_eq!(runner.env("GITHUB_SHA").as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_instant_sleep_counts() {
        let sleep = InstantSleep::new();
        let shared = sleep.shared();

        shared.sleep(Duration::from_secs(3600)).await;
        shared.sleep(Duration::from_secs(3600)).await;

        assert_eq!(sleep.call_count(), 2);
    }
}
