//! Remote identity service seam.
//!
//! This module defines the [`StsApi`] trait (the three STS operations the
//! action consumes) and the request shapes sent through it. The two role
//! assumption protocols are separate request types wrapped in
//! [`AssumptionRequest`], so a request is always exactly one of them.

use crate::credentials::CredentialSet;
use crate::tags::SessionTag;
use crate::Result;
use async_trait::async_trait;

/// Identity of the principal owning a set of credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// 12-digit account id
    pub account: String,
    /// Principal ARN (`arn:<partition>:iam::<account>:user/...`)
    pub arn: String,
}

impl CallerIdentity {
    /// Returns the partition segment of the caller ARN, defaulting to `aws`.
    ///
    /// ```
    /// use aws_creds_action::sts::CallerIdentity;
    ///
    /// let caller = CallerIdentity {
    ///     account: "123456789012".into(),
    ///     arn: "arn:aws-cn:iam::123456789012:user/ci".into(),
    /// };
    /// assert_eq!(caller.partition(), "aws-cn");
    /// ```
    pub fn partition(&self) -> &str {
        self.arn
            .strip_prefix("arn:")
            .and_then(|rest| rest.split(':').next())
            .filter(|partition| !partition.is_empty())
            .unwrap_or("aws")
    }
}

/// Opaque federated identity token.
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken(String);

impl IdentityToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityToken(** redacted **)")
    }
}

/// AssumeRole request, signed with the base credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: u32,
    pub external_id: Option<String>,
    /// `None` when tagging is skipped
    pub tags: Option<Vec<SessionTag>>,
    /// Base credentials used to sign the call
    pub credentials: CredentialSet,
}

/// AssumeRoleWithWebIdentity request, authenticated by the token alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: u32,
    pub identity_token: IdentityToken,
}

/// One role assumption request, in exactly one protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssumptionRequest {
    /// sts:AssumeRole
    Credentials(CredentialRequest),
    /// sts:AssumeRoleWithWebIdentity
    WebIdentity(TokenRequest),
}

impl AssumptionRequest {
    pub fn role_arn(&self) -> &str {
        match self {
            Self::Credentials(req) => &req.role_arn,
            Self::WebIdentity(req) => &req.role_arn,
        }
    }

    pub fn duration_seconds(&self) -> u32 {
        match self {
            Self::Credentials(req) => req.duration_seconds,
            Self::WebIdentity(req) => req.duration_seconds,
        }
    }

    /// Remote operation name, for logs and errors.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Credentials(_) => "AssumeRole",
            Self::WebIdentity(_) => "AssumeRoleWithWebIdentity",
        }
    }
}

/// The STS operations consumed by the action.
///
/// All implementations must be `Send + Sync`. Every call is independent;
/// retrying a call with the same request is always safe.
#[async_trait]
pub trait StsApi: Send + Sync {
    /// Looks up the identity owning `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Remote`](crate::ActionError::Remote) if the call
    /// fails or the response has no account.
    async fn get_caller_identity(&self, credentials: &CredentialSet) -> Result<CallerIdentity>;

    /// Exchanges base credentials for role credentials.
    async fn assume_role(&self, request: &CredentialRequest) -> Result<CredentialSet>;

    /// Exchanges a web identity token for role credentials.
    async fn assume_role_with_web_identity(&self, request: &TokenRequest) -> Result<CredentialSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_defaults_to_aws() {
        let caller = CallerIdentity {
            account: "123456789012".to_string(),
            arn: String::new(),
        };
        assert_eq!(caller.partition(), "aws");

        let gov = CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws-us-gov:sts::123456789012:assumed-role/ci/session".to_string(),
        };
        assert_eq!(gov.partition(), "aws-us-gov");
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = IdentityToken::new("eyJhbGciOi.secret.payload");
        assert!(!format!("{token:?}").contains("eyJ"));
        assert_eq!(token.as_str(), "eyJhbGciOi.secret.payload");
    }

    #[test]
    fn test_request_accessors() {
        let request = AssumptionRequest::WebIdentity(TokenRequest {
            role_arn: "arn:aws:iam::111111111111:role/MY-ROLE".to_string(),
            session_name: "GitHubActions".to_string(),
            duration_seconds: 3600,
            identity_token: IdentityToken::new("token"),
        });

        assert_eq!(request.role_arn(), "arn:aws:iam::111111111111:role/MY-ROLE");
        assert_eq!(request.duration_seconds(), 3600);
        assert_eq!(request.operation(), "AssumeRoleWithWebIdentity");
    }
}
