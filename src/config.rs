//! Action input configuration.

use crate::runner::InputSource;
use crate::{ActionError, Result};

/// Session name used when `role-session-name` is not supplied.
pub const DEFAULT_ROLE_SESSION_NAME: &str = "GitHubActions";

/// Input names as they appear in the action definition.
pub mod inputs {
    pub const ACCESS_KEY_ID: &str = "aws-access-key-id";
    pub const SECRET_ACCESS_KEY: &str = "aws-secret-access-key";
    pub const SESSION_TOKEN: &str = "aws-session-token";
    pub const REGION: &str = "aws-region";
    pub const ROLE_TO_ASSUME: &str = "role-to-assume";
    pub const ROLE_DURATION_SECONDS: &str = "role-duration-seconds";
    pub const ROLE_SESSION_NAME: &str = "role-session-name";
    pub const ROLE_EXTERNAL_ID: &str = "role-external-id";
    pub const ROLE_SKIP_SESSION_TAGGING: &str = "role-skip-session-tagging";
    pub const WEB_IDENTITY_TOKEN_FILE: &str = "web-identity-token-file";
    pub const MASK_AWS_ACCOUNT_ID: &str = "mask-aws-account-id";
}

/// Everything the action reads from its configured inputs.
///
/// Use [`ActionInputs::from_source`] in production; the builder methods exist
/// for tests and embedding:
///
/// ```
/// use aws_creds_action::ActionInputs;
///
/// let inputs = ActionInputs::new("us-east-1")
///     .with_static_credentials("AKIDEXAMPLE", "secret", None)
///     .with_role("arn:aws:iam::111111111111:role/deploy")
///     .with_duration_seconds(900);
///
/// assert_eq!(inputs.role_session_name, "GitHubActions");
/// assert!(inputs.mask_aws_account_id);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ActionInputs {
    /// Static access key id (`aws-access-key-id`)
    pub access_key_id: Option<String>,

    /// Static secret access key (`aws-secret-access-key`)
    pub secret_access_key: Option<String>,

    /// Static session token (`aws-session-token`)
    pub session_token: Option<String>,

    /// Target region (`aws-region`), validated before use
    pub region: String,

    /// Role ARN or bare role name (`role-to-assume`)
    pub role_to_assume: Option<String>,

    /// Explicit session duration (`role-duration-seconds`)
    pub role_duration_seconds: Option<u32>,

    /// Session name (default: "GitHubActions")
    pub role_session_name: String,

    /// External id for credential-based assumption (`role-external-id`)
    pub role_external_id: Option<String>,

    /// Skip session tags on credential-based assumption
    pub role_skip_session_tagging: bool,

    /// Web identity token file, absolute or relative to the workspace
    pub web_identity_token_file: Option<String>,

    /// Mask the account id output (default: true)
    pub mask_aws_account_id: bool,
}

impl std::fmt::Debug for ActionInputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionInputs")
            .field("access_key_id", &redacted(&self.access_key_id))
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("session_token", &redacted(&self.session_token))
            .field("region", &self.region)
            .field("role_to_assume", &self.role_to_assume)
            .field("role_duration_seconds", &self.role_duration_seconds)
            .field("role_session_name", &self.role_session_name)
            .field("role_external_id", &self.role_external_id)
            .field("role_skip_session_tagging", &self.role_skip_session_tagging)
            .field("web_identity_token_file", &self.web_identity_token_file)
            .field("mask_aws_account_id", &self.mask_aws_account_id)
            .finish()
    }
}

impl ActionInputs {
    /// Creates inputs for the given region with every other input at its default.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            region: region.into(),
            role_to_assume: None,
            role_duration_seconds: None,
            role_session_name: DEFAULT_ROLE_SESSION_NAME.to_string(),
            role_external_id: None,
            role_skip_session_tagging: false,
            web_identity_token_file: None,
            mask_aws_account_id: true,
        }
    }

    /// Reads all inputs from the runner.
    ///
    /// # Errors
    ///
    /// - [`ActionError::MissingInput`]: `aws-region` was not supplied
    /// - [`ActionError::InvalidInput`]: `role-duration-seconds` is not an
    ///   integer between 0 and `i32::MAX`
    pub fn from_source(source: &dyn InputSource) -> Result<Self> {
        let region = source
            .input(inputs::REGION)
            .ok_or_else(|| ActionError::MissingInput(inputs::REGION.to_string()))?;

        let role_duration_seconds = source
            .input(inputs::ROLE_DURATION_SECONDS)
            .map(|value| parse_duration(&value))
            .transpose()?;

        Ok(Self {
            access_key_id: source.input(inputs::ACCESS_KEY_ID),
            secret_access_key: source.input(inputs::SECRET_ACCESS_KEY),
            session_token: source.input(inputs::SESSION_TOKEN),
            region,
            role_to_assume: source.input(inputs::ROLE_TO_ASSUME),
            role_duration_seconds,
            role_session_name: source
                .input(inputs::ROLE_SESSION_NAME)
                .unwrap_or_else(|| DEFAULT_ROLE_SESSION_NAME.to_string()),
            role_external_id: source.input(inputs::ROLE_EXTERNAL_ID),
            role_skip_session_tagging: parse_flag(
                source.input(inputs::ROLE_SKIP_SESSION_TAGGING),
                false,
            ),
            web_identity_token_file: source.input(inputs::WEB_IDENTITY_TOKEN_FILE),
            mask_aws_account_id: parse_flag(source.input(inputs::MASK_AWS_ACCOUNT_ID), true),
        })
    }

    /// Sets the static credential triple.
    pub fn with_static_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self.session_token = session_token;
        self
    }

    /// Sets the role to assume (ARN or bare role name).
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role_to_assume = Some(role.into());
        self
    }

    /// Sets an explicit session duration.
    pub fn with_duration_seconds(mut self, seconds: u32) -> Self {
        self.role_duration_seconds = Some(seconds);
        self
    }

    /// Sets the role session name.
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.role_session_name = name.into();
        self
    }

    /// Sets the external id passed to AssumeRole.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.role_external_id = Some(external_id.into());
        self
    }

    /// Skips session tagging.
    pub fn with_skip_session_tagging(mut self, skip: bool) -> Self {
        self.role_skip_session_tagging = skip;
        self
    }

    /// Sets the web identity token file.
    pub fn with_web_identity_token_file(mut self, path: impl Into<String>) -> Self {
        self.web_identity_token_file = Some(path.into());
        self
    }

    /// Controls masking of the account id output.
    pub fn with_mask_account_id(mut self, mask: bool) -> Self {
        self.mask_aws_account_id = mask;
        self
    }
}

/// STS carries the duration as a signed 32-bit field.
fn parse_duration(value: &str) -> Result<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|seconds| i32::try_from(*seconds).is_ok())
        .ok_or_else(|| ActionError::InvalidInput {
            name: inputs::ROLE_DURATION_SECONDS.to_string(),
            value: value.to_string(),
        })
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "** redacted **")
}

/// Boolean inputs are true only for a case-insensitive "true".
fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => v.eq_ignore_ascii_case("true"),
        None => default,
    }
}
