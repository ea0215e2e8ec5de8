use thiserror::Error;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum MessagingError {
    /// A connect option was malformed. Reported before anything is sent.
    #[error("The {option} option must be a {requirement}, {value} was provided")]
    InvalidOption {
        option: &'static str,
        requirement: &'static str,
        value: String,
    },

    /// No matching confirmation arrived within the message's budget.
    #[error("The message timed out after {millis} milliseconds")]
    Timeout {
        millis: u64,
    },

    /// Every handshake attempt timed out.
    #[error("Failed to establish connection: handshake failed after {attempts} attempts")]
    HandshakeFailed {
        attempts: u64,
    },
}
