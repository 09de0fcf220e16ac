//! Session tags built from GitHub job metadata.
//!
//! STS tag values allow at most 256 characters from a restricted set. Job
//! metadata is free-form (workflow names may contain emoji, bot actors end in
//! `[bot]`), so every value goes through [`sanitize`] first.

use crate::runner::InputSource;
use crate::{ActionError, Result};

/// Maximum length of an STS session tag value.
pub const MAX_TAG_VALUE_LENGTH: usize = 256;

/// Replacement for characters STS does not accept in tag values.
pub const SANITIZATION_CHARACTER: char = '_';

/// A single session tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag {
    /// Tag key
    pub key: String,
    /// Tag value (already sanitized)
    pub value: String,
}

impl SessionTag {
    /// Creates a tag, sanitizing the value.
    pub fn new(key: impl Into<String>, value: &str) -> Self {
        Self {
            key: key.into(),
            value: sanitize(value),
        }
    }
}

/// Cleans a string into a legal tag value.
///
/// Keeps the first 256 characters, then replaces every character outside
/// `[A-Za-z0-9+-=._:/@]` with `_`, one for one. Unicode scalars count as one
/// character each.
///
/// # Example
///
/// ```
/// use aws_creds_action::tags::sanitize;
///
/// assert_eq!(sanitize("MY-USERNAME[bot]"), "MY-USERNAME_bot_");
/// assert_eq!(sanitize("refs/heads/main"), "refs/heads/main");
/// ```
pub fn sanitize(value: &str) -> String {
    value
        .chars()
        .take(MAX_TAG_VALUE_LENGTH)
        .map(|c| {
            if is_allowed(c) {
                c
            } else {
                SANITIZATION_CHARACTER
            }
        })
        .collect()
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '=' | '.' | '_' | ':' | '/' | '@')
}

/// Environment variables the runner sets for every job.
pub mod env {
    pub const REPOSITORY: &str = "GITHUB_REPOSITORY";
    pub const WORKFLOW: &str = "GITHUB_WORKFLOW";
    pub const ACTION: &str = "GITHUB_ACTION";
    pub const ACTOR: &str = "GITHUB_ACTOR";
    pub const SHA: &str = "GITHUB_SHA";
    pub const REF: &str = "GITHUB_REF";
}

/// Metadata describing the running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetadata {
    pub repository: String,
    pub workflow: String,
    pub action: String,
    pub actor: String,
    pub sha: String,
    /// Branch reference; absent for some event types
    pub git_ref: Option<String>,
}

impl JobMetadata {
    /// Reads job metadata from the runner environment.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingJobMetadata`] if any required variable is
    /// missing. `GITHUB_REF` is optional.
    pub fn from_source(source: &dyn InputSource) -> Result<Self> {
        let required = |name: &str| source.env(name).ok_or(ActionError::MissingJobMetadata);

        Ok(Self {
            repository: required(env::REPOSITORY)?,
            workflow: required(env::WORKFLOW)?,
            action: required(env::ACTION)?,
            actor: required(env::ACTOR)?,
            sha: required(env::SHA)?,
            git_ref: source.env(env::REF),
        })
    }

    /// Builds session tags in fixed schema order.
    ///
    /// `Branch` is appended last, and only when a branch reference exists.
    pub fn session_tags(&self) -> Vec<SessionTag> {
        let mut tags = vec![
            SessionTag::new("GitHub", "Actions"),
            SessionTag::new("Repository", &self.repository),
            SessionTag::new("Workflow", &self.workflow),
            SessionTag::new("Action", &self.action),
            SessionTag::new("Actor", &self.actor),
            SessionTag::new("Commit", &self.sha),
        ];

        if let Some(ref git_ref) = self.git_ref {
            tags.push(SessionTag::new("Branch", git_ref));
        }

        tags
    }
}
