//! Error types for credential resolution and role assumption.

use thiserror::Error;

/// Result type alias using [`ActionError`].
pub type Result<T> = std::result::Result<T, ActionError>;

/// Errors that can end an action run.
///
/// Every variant is fatal. The orchestrator converts whichever one surfaces
/// into a single failure report; nothing here is meant to crash the process.
#[derive(Debug, Error)]
pub enum ActionError {
    /// One of the required GitHub job metadata variables is absent.
    #[error("Missing required environment variables. Are you running in GitHub Actions?")]
    MissingJobMetadata,

    /// Inputs were supplied in a combination that can never work.
    #[error("{0}")]
    InvalidInputCombination(String),

    /// No credential source yielded usable credentials.
    #[error("Credentials could not be loaded, please check your action inputs: {0}")]
    CredentialsUnavailable(String),

    /// The credentials the SDK loaded are not the ones the action staged.
    #[error("Unexpected failure: Credentials loaded by the SDK do not match the access key ID configured by the action")]
    CredentialsInconsistent,

    /// Region failed syntax validation.
    #[error("Region is not valid: {0}")]
    InvalidRegion(String),

    /// Role assumption kept failing until the retry budget ran out.
    #[error("Could not assume role after {attempts} attempts: {source}")]
    AssumptionFailed {
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        source: Box<ActionError>,
    },

    /// A required input was not supplied.
    #[error("Input required and not supplied: {0}")]
    MissingInput(String),

    /// An input value could not be parsed.
    #[error("Invalid value for input '{name}': {value}")]
    InvalidInput {
        /// Input name
        name: String,
        /// Offending value
        value: String,
    },

    /// The web identity token could not be obtained.
    #[error("{0}")]
    TokenUnavailable(String),

    /// A single remote call failed.
    #[error("{operation} failed: {message}")]
    Remote {
        /// Remote operation name (GetCallerIdentity, AssumeRole, ...)
        operation: String,
        /// Rendered error from the remote side
        message: String,
    },

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    /// Creates a remote-call error with the operation name attached.
    ///
    /// # Example
    ///
    /// ```
    /// use aws_creds_action::ActionError;
    ///
    /// let err = ActionError::remote("AssumeRole", "AccessDenied");
    /// assert_eq!(err.to_string(), "AssumeRole failed: AccessDenied");
    /// ```
    pub fn remote(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Returns true for failures that indicate an internal inconsistency
    /// rather than bad user input.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::CredentialsInconsistent)
    }

    /// Renders the error together with every error in its source chain.
    pub fn detail(&self) -> String {
        let mut detail = format!("{self:?}");
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            detail.push_str("\nCaused by: ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }
}
