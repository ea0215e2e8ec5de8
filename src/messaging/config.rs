use std::time::Duration;

use serde::Deserialize;
use serde_json::{Number, Value};

use crate::messaging::error::MessagingError;

pub const DEFAULT_MESSAGE_CONFIRMATION_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_HANDSHAKE_RETRIES: u64 = 2;
pub const DEFAULT_HANDSHAKE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Origin value meaning 'no origin restriction'
pub const WILDCARD_ORIGIN: &str = "*";

/// Largest integer that peers representing numbers as doubles can handle exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Options for [crate::messaging::messaging::Messaging::connect], as supplied by the caller.
///
/// Numeric options are kept as JSON numbers until [ConnectOptions::validate] so that options
///  loaded from configuration files are checked with the same rules (and error messages) as
///  options built in code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// opaque multiplexing key, compared by equality on both sides
    pub channel: Value,
    /// per-message confirmation timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<Number>,
    #[serde(default)]
    pub handshake_retries: Option<Number>,
    /// delay between a timed out handshake attempt and the next one, in milliseconds
    #[serde(default)]
    pub handshake_retry_delay: Option<Number>,
    /// absent or empty means [WILDCARD_ORIGIN]
    #[serde(default)]
    pub origin: Option<String>,
}

impl ConnectOptions {
    pub fn new(channel: impl Into<Value>) -> ConnectOptions {
        ConnectOptions {
            channel: channel.into(),
            timeout: None,
            handshake_retries: None,
            handshake_retry_delay: None,
            origin: None,
        }
    }

    pub fn timeout(mut self, millis: impl Into<Number>) -> Self {
        self.timeout = Some(millis.into());
        self
    }

    pub fn handshake_retries(mut self, retries: impl Into<Number>) -> Self {
        self.handshake_retries = Some(retries.into());
        self
    }

    pub fn handshake_retry_delay(mut self, millis: impl Into<Number>) -> Self {
        self.handshake_retry_delay = Some(millis.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// the origin to restrict a listener to, if any
    pub fn origin_restriction(&self) -> Option<&str> {
        self.origin.as_deref()
            .filter(|o| !o.is_empty())
    }

    pub fn validate(&self) -> Result<ConnectConfig, MessagingError> {
        let timeout = match &self.timeout {
            None => DEFAULT_MESSAGE_CONFIRMATION_TIMEOUT,
            Some(n) => Duration::from_millis(positive_integer("timeout", n)?),
        };
        let handshake_retries = match &self.handshake_retries {
            None => DEFAULT_HANDSHAKE_RETRIES,
            Some(n) => non_negative_integer("handshakeRetries", n)?,
        };
        let handshake_retry_delay = match &self.handshake_retry_delay {
            None => DEFAULT_HANDSHAKE_RETRY_DELAY,
            Some(n) => Duration::from_millis(positive_integer("handshakeRetryDelay", n)?),
        };

        Ok(ConnectConfig {
            channel: self.channel.clone(),
            timeout,
            handshake_retries,
            handshake_retry_delay,
            origin: self.origin_restriction()
                .unwrap_or(WILDCARD_ORIGIN)
                .to_string(),
        })
    }
}

/// Validated connect options
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectConfig {
    pub channel: Value,
    pub timeout: Duration,
    pub handshake_retries: u64,
    pub handshake_retry_delay: Duration,
    pub origin: String,
}

impl ConnectConfig {
    /// total number of handshake messages sent before giving up
    pub fn handshake_attempts(&self) -> u64 {
        self.handshake_retries + 1
    }
}

fn as_integer(n: &Number) -> Option<i128> {
    if let Some(i) = n.as_i64() {
        return Some(i.into());
    }
    if let Some(u) = n.as_u64() {
        return Some(u.into());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => Some(f as i128),
        _ => None,
    }
}

fn positive_integer(option: &'static str, n: &Number) -> Result<u64, MessagingError> {
    as_integer(n)
        .filter(|&i| i > 0)
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| MessagingError::InvalidOption {
            option,
            requirement: "positive integer",
            value: n.to_string(),
        })
}

fn non_negative_integer(option: &'static str, n: &Number) -> Result<u64, MessagingError> {
    as_integer(n)
        .and_then(|i| u64::try_from(i).ok())
        .ok_or_else(|| MessagingError::InvalidOption {
            option,
            requirement: "non-negative integer",
            value: n.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectOptions::new("c").validate().unwrap();
        assert_eq!(config, ConnectConfig {
            channel: json!("c"),
            timeout: Duration::from_secs(10),
            handshake_retries: 2,
            handshake_retry_delay: Duration::from_millis(500),
            origin: "*".to_string(),
        });
        assert_eq!(config.handshake_attempts(), 3);
    }

    #[test]
    fn test_explicit_values() {
        let config = ConnectOptions::new(7)
            .timeout(100)
            .handshake_retries(0)
            .handshake_retry_delay(50)
            .origin("https://a.example")
            .validate()
            .unwrap();
        assert_eq!(config.channel, json!(7));
        assert_eq!(config.timeout, Duration::from_millis(100));
        assert_eq!(config.handshake_retries, 0);
        assert_eq!(config.handshake_retry_delay, Duration::from_millis(50));
        assert_eq!(config.origin, "https://a.example");
    }

    #[test]
    fn test_empty_origin_is_wildcard() {
        let options = ConnectOptions::new("c").origin("");
        assert_eq!(options.origin_restriction(), None);
        assert_eq!(options.validate().unwrap().origin, "*");
    }

    #[rstest]
    #[case::timeout_fraction(json!({"channel": "c", "timeout": 1.5}), "timeout", "1.5")]
    #[case::timeout_zero(json!({"channel": "c", "timeout": 0}), "timeout", "0")]
    #[case::timeout_negative(json!({"channel": "c", "timeout": -1}), "timeout", "-1")]
    #[case::retries_fraction(json!({"channel": "c", "handshakeRetries": 0.5}), "handshakeRetries", "0.5")]
    #[case::retries_negative(json!({"channel": "c", "handshakeRetries": -2}), "handshakeRetries", "-2")]
    #[case::delay_fraction(json!({"channel": "c", "handshakeRetryDelay": 2.25}), "handshakeRetryDelay", "2.25")]
    #[case::delay_zero(json!({"channel": "c", "handshakeRetryDelay": 0}), "handshakeRetryDelay", "0")]
    #[case::delay_negative(json!({"channel": "c", "handshakeRetryDelay": -500}), "handshakeRetryDelay", "-500")]
    fn test_invalid_options(#[case] raw: Value, #[case] expected_option: &str, #[case] expected_value: &str) {
        let options: ConnectOptions = serde_json::from_value(raw).unwrap();
        match options.validate() {
            Err(MessagingError::InvalidOption { option, value, .. }) => {
                assert_eq!(option, expected_option);
                assert_eq!(value, expected_value);
            }
            other => panic!("expected a validation error, was {:?}", other),
        }

        let message = options.validate().unwrap_err().to_string();
        assert!(message.contains(&format!(" {} ", expected_value)), "{}", message);
        assert!(message.contains(expected_option), "{}", message);
    }

    #[rstest]
    #[case::zero_retries(json!({"channel": "c", "handshakeRetries": 0}))]
    #[case::integral_float(json!({"channel": "c", "timeout": 2.0, "handshakeRetryDelay": 1.0}))]
    #[case::all_set(json!({"channel": {"k": 1}, "timeout": 5, "handshakeRetries": 3, "handshakeRetryDelay": 9, "origin": "o"}))]
    fn test_valid_options(#[case] raw: Value) {
        let options: ConnectOptions = serde_json::from_value(raw).unwrap();
        assert!(options.validate().is_ok());
    }
}
