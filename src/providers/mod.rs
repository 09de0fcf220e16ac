//! Concrete implementations of the runner and remote service seams.

pub mod github;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "sdk")]
pub mod aws;

#[cfg(feature = "sdk")]
pub mod oidc;

/// Registers every compiled service provider with the factory.
pub fn register_all() {
    #[cfg(feature = "mock")]
    mock::register();

    #[cfg(feature = "sdk")]
    aws::register();
}
