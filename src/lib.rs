//! aws-creds-action - AWS credentials for GitHub Actions jobs.
//!
//! Resolves base credentials (static inputs or whatever the host provides),
//! optionally assumes a role through STS, and publishes the result to later
//! job steps. Every secret is registered for masking before it is published.
//!
//! # Flow
//!
//! 1. Read inputs and, when a role is requested, the job metadata used for
//!    session tags
//! 2. Validate the region
//! 3. Resolve base credentials and look up their account
//! 4. Assume the role, by AssumeRole or AssumeRoleWithWebIdentity, retrying
//!    up to 12 times
//! 5. Export region, credentials and the account id
//!
//! # Quick Start
//!
//! ```no_run
//! use aws_creds_action::action::Action;
//! use aws_creds_action::factory;
//! use aws_creds_action::providers::github::GithubRunner;
//!
//! #[tokio::main]
//! async fn main() -> aws_creds_action::Result<()> {
//!     aws_creds_action::init();
//!
//!     let runner = GithubRunner::from_env();
//!     let services = factory::new_services("aws")?;
//!     let outcome = Action::new(&runner, &runner, services.as_ref()).run().await?;
//!
//!     println!("account: {:?}", outcome.account_id);
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Provides |
//! |---------|---------|----------|
//! | `sdk` | yes | AWS SDK and OIDC providers, the `aws-creds-action` binary |
//! | `mock` | yes | In-memory runner and service doubles |

pub mod action;
pub mod assume;
pub mod config;
pub mod credentials;
pub mod error;
pub mod export;
pub mod factory;
pub mod providers;
pub mod runner;
pub mod sts;
pub mod tags;
pub mod token;
pub mod validation;

pub use config::ActionInputs;
pub use credentials::CredentialSet;
pub use error::{ActionError, Result};
pub use runner::{ExportSink, InputSource};

use std::sync::Once;

static INIT: Once = Once::new();

/// Registers every compiled provider with the factory.
///
/// Idempotent.
pub fn init() {
    INIT.call_once(providers::register_all);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_initialization() {
        init();
        init();
    }

    #[test]
    #[cfg(feature = "mock")]
    fn test_mock_provider_registered() {
        init();

        let services = factory::new_services("mock").unwrap();
        assert_eq!(services.name(), "mock");
    }
}
