//! Role assumption: request construction and the bounded retry loop.

use crate::config::ActionInputs;
use crate::credentials::CredentialSet;
use crate::sts::{
    AssumptionRequest, CallerIdentity, CredentialRequest, IdentityToken, StsApi, TokenRequest,
};
use crate::tags::JobMetadata;
use crate::{ActionError, Result};
use aws_smithy_async::rt::sleep::{AsyncSleep, SharedAsyncSleep};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Total attempts made for one assumption request.
pub const MAX_ATTEMPTS: u32 = 12;

/// Default duration for long-lived base credentials (6 hours).
pub const DEFAULT_ROLE_DURATION_SECONDS: u32 = 21_600;

/// Default duration when the caller is itself a temporary session, or when
/// assuming with a web identity token (1 hour).
pub const SESSION_ROLE_DURATION_SECONDS: u32 = 3_600;

/// Base of the jittered exponential backoff.
const BACKOFF_BASE_MILLIS: f64 = 50.0;

/// Expands a bare role name into a full role ARN.
///
/// Values starting with `arn:` are returned unchanged. Otherwise the caller's
/// partition and account are used: `arn:<partition>:iam::<account>:role/<name>`.
///
/// # Errors
///
/// Returns [`ActionError::InvalidInputCombination`] when a bare name is given
/// but no caller identity is known (pure token flows have no base account).
///
/// # Example
///
/// ```
/// use aws_creds_action::assume::qualify_role_arn;
/// use aws_creds_action::sts::CallerIdentity;
///
/// let caller = CallerIdentity {
///     account: "123456789012".into(),
///     arn: "arn:aws:iam::123456789012:user/ci".into(),
/// };
/// assert_eq!(
///     qualify_role_arn("deploy", Some(&caller)).unwrap(),
///     "arn:aws:iam::123456789012:role/deploy"
/// );
/// ```
pub fn qualify_role_arn(role: &str, caller: Option<&CallerIdentity>) -> Result<String> {
    if role.starts_with("arn:") {
        return Ok(role.to_string());
    }

    let caller = caller.ok_or_else(|| {
        ActionError::InvalidInputCombination(
            "Source Account ID is needed if the Role Name is provided and not the Role Arn."
                .to_string(),
        )
    })?;

    Ok(format!(
        "arn:{}:iam::{}:role/{}",
        caller.partition(),
        caller.account,
        role
    ))
}

/// Picks the session duration.
///
/// An explicit value is used verbatim. Otherwise one hour when the base
/// credentials carry a session token or the request is token based, and six
/// hours for long-lived keys.
pub fn resolve_duration(explicit: Option<u32>, short_lived_caller: bool) -> u32 {
    match explicit {
        Some(seconds) => seconds,
        None if short_lived_caller => SESSION_ROLE_DURATION_SECONDS,
        None => DEFAULT_ROLE_DURATION_SECONDS,
    }
}

/// Builds an AssumeRole request signed by `base`.
///
/// `metadata` is required unless tagging is skipped; pass `None` only then.
pub fn credential_request(
    inputs: &ActionInputs,
    role_arn: String,
    base: &CredentialSet,
    metadata: Option<&JobMetadata>,
) -> CredentialRequest {
    let tags = if inputs.role_skip_session_tagging {
        debug!("Role session tagging has been skipped");
        None
    } else {
        metadata.map(JobMetadata::session_tags)
    };

    if let Some(ref tags) = tags {
        debug!("{} role session tags are being used", tags.len());
    }

    CredentialRequest {
        role_arn,
        session_name: inputs.role_session_name.clone(),
        duration_seconds: resolve_duration(
            inputs.role_duration_seconds,
            base.session_token.is_some(),
        ),
        external_id: inputs.role_external_id.clone(),
        tags,
        credentials: base.clone(),
    }
}

/// Builds an AssumeRoleWithWebIdentity request.
pub fn token_request(
    inputs: &ActionInputs,
    role_arn: String,
    identity_token: IdentityToken,
) -> TokenRequest {
    TokenRequest {
        role_arn,
        session_name: inputs.role_session_name.clone(),
        duration_seconds: resolve_duration(inputs.role_duration_seconds, true),
        identity_token,
    }
}

/// Attempt counter for one assumption request.
#[derive(Debug)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
    last_error: Option<ActionError>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
        }
    }

    /// Number of failed attempts so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn record_failure(&mut self, err: ActionError) {
        self.attempt += 1;
        self.last_error = Some(err);
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn into_error(self) -> ActionError {
        let source = self
            .last_error
            .unwrap_or_else(|| ActionError::Other(anyhow::anyhow!("no attempt was made")));
        ActionError::AssumptionFailed {
            attempts: self.attempt,
            source: Box::new(source),
        }
    }
}

/// Random delay in `[0, 2^(failures-1) * 50ms)`.
fn backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16) as i32;
    let cap = 2f64.powi(exponent) * BACKOFF_BASE_MILLIS;
    Duration::from_millis((rand::random::<f64>() * cap) as u64)
}

/// Runs role assumption against STS with a bounded retry policy.
///
/// Every attempt sends the identical request; nothing is re-derived between
/// attempts. The wait between attempts goes through the injected sleep, so
/// the policy is driven by attempt count only.
pub struct RoleAssumer<'a> {
    sts: &'a dyn StsApi,
    sleep: SharedAsyncSleep,
    max_attempts: u32,
}

impl<'a> RoleAssumer<'a> {
    pub fn new(sts: &'a dyn StsApi, sleep: SharedAsyncSleep) -> Self {
        Self {
            sts,
            sleep,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    /// Overrides the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Assumes the role described by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::AssumptionFailed`] wrapping the last error once
    /// every attempt has failed.
    pub async fn assume(&self, request: &AssumptionRequest) -> Result<CredentialSet> {
        info!(
            role_arn = request.role_arn(),
            operation = request.operation(),
            duration_seconds = request.duration_seconds(),
            "Assuming role"
        );

        let mut state = RetryState::new(self.max_attempts);
        loop {
            match self.attempt(request).await {
                Ok(credentials) => {
                    info!(attempts = state.attempt() + 1, "Role assumed");
                    return Ok(credentials);
                }
                Err(err) => {
                    warn!(
                        attempt = state.attempt() + 1,
                        "{} failed: {err}",
                        request.operation()
                    );
                    state.record_failure(err);
                    if state.exhausted() {
                        return Err(state.into_error());
                    }
                    self.sleep.sleep(backoff(state.attempt())).await;
                }
            }
        }
    }

    async fn attempt(&self, request: &AssumptionRequest) -> Result<CredentialSet> {
        match request {
            AssumptionRequest::Credentials(req) => self.sts.assume_role(req).await,
            AssumptionRequest::WebIdentity(req) => {
                self.sts.assume_role_with_web_identity(req).await
            }
        }
    }
}
