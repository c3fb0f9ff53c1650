//! Typed errors for the two external collaborators.
//!
//! Configuration problems are surfaced as `anyhow::Error` with context at
//! startup and are fatal; everything here is recoverable by the poll loop.

use thiserror::Error;

/// Failure while driving the portal through the browser. The poll loop logs
/// these, notifies once per failure streak, and keeps the last good snapshot.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Sign-in did not reach the booking page (bad credentials, portal
    /// change, or timeout on the login form).
    #[error("portal login failed: {0}")]
    Login(String),

    /// The booking page did not match the expected structure.
    #[error("failed to parse portal page: {0}")]
    Parse(String),

    /// Underlying WebDriver/browser failure.
    #[error(transparent)]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    /// The managed chromedriver process could not be started or reached.
    #[error("chromedriver unavailable: {0}")]
    Driver(String),
}

/// Failure while delivering a chat message. Logged only; never retried and
/// never allowed to stop the poll loop.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Discord API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
