//! Web identity token sources.
//!
//! A token comes from, in order of preference: the `web-identity-token-file`
//! input, the `AWS_WEB_IDENTITY_TOKEN_FILE` environment variable, or a fresh
//! OIDC token minted by the runner's token endpoint.

use crate::config::ActionInputs;
use crate::runner::InputSource;
use crate::sts::IdentityToken;
use crate::{ActionError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Audience requested for runner-issued OIDC tokens.
pub const STS_AUDIENCE: &str = "sts.amazonaws.com";

pub mod env {
    pub const WORKSPACE: &str = "GITHUB_WORKSPACE";
    pub const WEB_IDENTITY_TOKEN_FILE: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
    pub const ID_TOKEN_REQUEST_URL: &str = "ACTIONS_ID_TOKEN_REQUEST_URL";
    pub const ID_TOKEN_REQUEST_TOKEN: &str = "ACTIONS_ID_TOKEN_REQUEST_TOKEN";
}

/// Mints OIDC tokens from the CI platform's identity provider.
#[async_trait]
pub trait IdentityTokenIssuer: Send + Sync {
    /// Requests a token for `audience`.
    async fn fetch(&self, audience: &str) -> anyhow::Result<String>;
}

/// Where the identity token for a token-based assumption comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A token file on disk (already resolved against the workspace)
    File(PathBuf),
    /// The runner's OIDC token endpoint
    Oidc {
        request_url: String,
        request_token: String,
    },
}

/// Decides whether the assumption should be token based, and from where.
///
/// Returns `None` for credential-based assumption. Only an explicit
/// `web-identity-token-file` input overrides static credential inputs; the
/// environment-provided token file and the OIDC endpoint are used only when
/// no static access key id was supplied.
pub fn select(inputs: &ActionInputs, source: &dyn InputSource) -> Option<TokenSource> {
    inputs.role_to_assume.as_ref()?;

    let workspace = source.env(env::WORKSPACE);

    if let Some(ref file) = inputs.web_identity_token_file {
        return Some(TokenSource::File(resolve_path(file, workspace.as_deref())));
    }

    if inputs.access_key_id.is_some() {
        return None;
    }

    if let Some(file) = source.env(env::WEB_IDENTITY_TOKEN_FILE) {
        return Some(TokenSource::File(resolve_path(&file, workspace.as_deref())));
    }

    match (
        source.env(env::ID_TOKEN_REQUEST_URL),
        source.env(env::ID_TOKEN_REQUEST_TOKEN),
    ) {
        (Some(request_url), Some(request_token)) => Some(TokenSource::Oidc {
            request_url,
            request_token,
        }),
        _ => None,
    }
}

/// Absolute paths are kept; relative paths are joined onto the workspace.
pub fn resolve_path(file: &str, workspace: Option<&str>) -> PathBuf {
    let path = Path::new(file);
    match workspace {
        Some(root) if path.is_relative() => Path::new(root).join(path),
        _ => path.to_path_buf(),
    }
}

/// Reads a token file.
///
/// # Errors
///
/// Returns [`ActionError::TokenUnavailable`] if the file is missing or
/// unreadable.
pub async fn read_token_file(path: &Path) -> Result<IdentityToken> {
    debug!(path = %path.display(), "Reading web identity token file");

    let unreadable = |e: std::io::Error| {
        ActionError::TokenUnavailable(format!("Web identity token file could not be read: {e}"))
    };

    if !tokio::fs::try_exists(path).await.map_err(unreadable)? {
        return Err(ActionError::TokenUnavailable(format!(
            "Web identity token file does not exist: {}",
            path.display()
        )));
    }

    let contents = tokio::fs::read_to_string(path).await.map_err(unreadable)?;

    Ok(IdentityToken::new(contents.trim()))
}

/// Fetches a runner-issued OIDC token.
pub async fn fetch_oidc_token(issuer: &dyn IdentityTokenIssuer) -> Result<IdentityToken> {
    debug!(audience = STS_AUDIENCE, "Requesting OIDC token from runner");

    let token = issuer
        .fetch(STS_AUDIENCE)
        .await
        .map_err(|e| ActionError::TokenUnavailable(format!("getIDToken call failed: {e}")))?;

    Ok(IdentityToken::new(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    struct Env(HashMap<&'static str, String>);

    impl InputSource for Env {
        fn input(&self, _name: &str) -> Option<String> {
            None
        }

        fn env(&self, name: &str) -> Option<String> {
            self.0.get(name).cloned()
        }
    }

    fn oidc_env() -> Env {
        Env(HashMap::from([
            (env::WORKSPACE, "/home/github".to_string()),
            (
                env::ID_TOKEN_REQUEST_URL,
                "https://token.example/?x=1".to_string(),
            ),
            (env::ID_TOKEN_REQUEST_TOKEN, "request-token".to_string()),
        ]))
    }

    const ROLE: &str = "arn:aws:iam::111111111111:role/MY-ROLE";

    #[test]
    fn test_no_role_means_no_token() {
        let inputs = ActionInputs::new("us-east-1").with_web_identity_token_file("/token");
        assert_eq!(select(&inputs, &oidc_env()), None);
    }

    #[test]
    fn test_explicit_file_wins() {
        let inputs = ActionInputs::new("us-east-1")
            .with_role(ROLE)
            .with_static_credentials("AKID", "SECRET", None)
            .with_web_identity_token_file("fake/token/file");

        assert_eq!(
            select(&inputs, &oidc_env()),
            Some(TokenSource::File(PathBuf::from("/home/github/fake/token/file")))
        );
    }

    #[test]
    fn test_env_file_before_oidc() {
        let mut env = oidc_env();
        env.0
            .insert(env::WEB_IDENTITY_TOKEN_FILE, "/var/run/token".to_string());
        let inputs = ActionInputs::new("us-east-1").with_role(ROLE);

        assert_eq!(
            select(&inputs, &env),
            Some(TokenSource::File(PathBuf::from("/var/run/token")))
        );
    }

    #[test]
    fn test_oidc_context() {
        let inputs = ActionInputs::new("us-east-1").with_role(ROLE);

        assert_eq!(
            select(&inputs, &oidc_env()),
            Some(TokenSource::Oidc {
                request_url: "https://token.example/?x=1".to_string(),
                request_token: "request-token".to_string(),
            })
        );
    }

    #[test]
    fn test_static_credentials_disable_oidc() {
        let inputs = ActionInputs::new("us-east-1")
            .with_role(ROLE)
            .with_static_credentials("AKID", "SECRET", None);

        assert_eq!(select(&inputs, &oidc_env()), None);
    }

    #[test]
    fn test_oidc_needs_both_variables() {
        let mut env = oidc_env();
        env.0.remove(env::ID_TOKEN_REQUEST_URL);
        let inputs = ActionInputs::new("us-east-1").with_role(ROLE);

        assert_eq!(select(&inputs, &env), None);
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            resolve_path("/fake/token/file", Some("/home/github")),
            PathBuf::from("/fake/token/file")
        );
        assert_eq!(
            resolve_path("fake/token/file", Some("/home/github")),
            PathBuf::from("/home/github/fake/token/file")
        );
        assert_eq!(resolve_path("token", None), PathBuf::from("token"));
    }

    #[tokio::test]
    async fn test_read_token_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "testpayload\n").unwrap();

        let token = read_token_file(&path).await.unwrap();
        assert_eq!(token.as_str(), "testpayload");
    }

    #[tokio::test]
    async fn test_missing_token_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");

        let err = read_token_file(&path).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Web identity token file does not exist: "));
    }

    #[tokio::test]
    async fn test_token_file_io_error() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain");
        std::fs::write(&plain, "not a directory").unwrap();

        let err = read_token_file(&plain.join("token")).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Web identity token file could not be read: "));
    }
}
