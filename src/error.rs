//! Error types for the protocol engine.
//!
//! Every failure the engine can observe is a [`LinkError`]. Variants carry enough
//! structured context to log the problem where it happens and decide how far it
//! propagates.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: A channel could not be opened against its endpoint
//! - **Transport Errors**: The underlying socket failed while receiving or sending
//! - **Decode Errors**: A wire message was malformed or its payload truncated
//! - **Sequence Gaps**: The data channel skipped one or more message numbers
//! - **Protocol Violations**: A command was sent while another is still unanswered
//! - **Heartbeat Timeouts**: The command channel stopped answering
//! - **Unknown Types**: A message type or event type code outside the known table
//!
//! ## Scope of a Failure
//!
//! Only transport errors end a tick. Everything else is scoped to a single
//! message or command:
//!
//! ```rust
//! use ephys_link::LinkError;
//!
//! let error = LinkError::decode("event payload", "expected 10 bytes, got 4");
//! assert!(!error.is_fatal());
//!
//! let error = LinkError::transport("data channel receive", "socket closed");
//! assert!(error.is_fatal());
//! ```
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use ephys_link::LinkError;
//!
//! let error = LinkError::connection_failed("tcp://localhost:5557", "connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for engine operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport failure during {context}: {details}")]
    Transport { context: String, details: String },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Message sequence gap: expected {expected}, received {received}")]
    SequenceGap { expected: i64, received: i64 },

    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("Command channel silent for {elapsed:?} ({})", severity(.hard))]
    HeartbeatTimeout { elapsed: Duration, hard: bool },

    #[error("Unknown message type '{kind}'")]
    UnknownMessageType { kind: String },

    #[error("Unknown event type code {code}")]
    UnknownEventType { code: i64 },

    #[error("Failed to serialize {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

fn severity(hard: &bool) -> &'static str {
    if *hard { "connection lost" } else { "retrying" }
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Connection { .. } => true,
            LinkError::Transport { .. } => true,
            LinkError::HeartbeatTimeout { .. } => true,
            LinkError::ProtocolViolation { .. } => true,
            LinkError::SequenceGap { .. } => false,
            LinkError::File { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::Decode { .. } => false,
            LinkError::UnknownMessageType { .. } => false,
            LinkError::UnknownEventType { .. } => false,
            LinkError::Serialization { .. } => false,
        }
    }

    /// Returns whether this error must stop the current tick.
    ///
    /// Transport failures are the only errors that escape the poll loop; all
    /// others are logged where they occur and affect a single message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::Transport { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Connection { .. } => vec![
                "Ensure the Open Ephys GUI is running with the ZMQ interface enabled",
                "Check the data and command endpoint addresses",
                "Verify no firewall blocks the configured ports",
            ],
            LinkError::Transport { .. } => vec![
                "Restart the engine to rebuild both channels",
                "Check that the controller process is still alive",
            ],
            LinkError::File { .. } => vec![
                "Check the configuration file exists and is readable",
                "Check file permissions",
            ],
            LinkError::Config { .. } => vec![
                "Review the configuration values against the documented defaults",
                "Ensure the channel count matches the controller's stream",
            ],
            LinkError::Decode { .. } => vec![
                "Check the controller and client agree on the wire format version",
                "Inspect the logged header for missing or mistyped fields",
            ],
            LinkError::SequenceGap { .. } => vec![
                "Reduce consumer callback work so the poll loop keeps up",
                "Increase the controller's send high-water mark",
            ],
            LinkError::ProtocolViolation { .. } => vec![
                "Wait for the outstanding acknowledgement before sending",
                "Retry the command on a later tick",
            ],
            LinkError::HeartbeatTimeout { .. } => vec![
                "Check the controller is responsive",
                "Increase the dead-connection threshold on slow links",
            ],
            LinkError::UnknownMessageType { .. } | LinkError::UnknownEventType { .. } => vec![
                "Update the client to a version that understands this controller",
                "Check the controller plugin version",
            ],
            LinkError::Serialization { .. } => vec!["Check command fields hold serializable values"],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::Connection { endpoint: endpoint.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        endpoint: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for transport failures.
    pub fn transport(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Transport { context: context.into(), details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        LinkError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        LinkError::Config { reason: reason.into() }
    }

    /// Helper constructor for decode errors.
    pub fn decode(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol_violation(reason: impl Into<String>) -> Self {
        LinkError::ProtocolViolation { reason: reason.into() }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_carry_their_context(
                endpoint in "tcp://[a-z]{1,12}:[0-9]{2,5}",
                reason in ".*",
                details in ".*",
                kind in "[a-z_]{1,16}",
                code in 7i64..1000,
                expected in 0i64..1_000_000,
                gap in 2i64..1000,
            ) {
                let connection = LinkError::connection_failed(endpoint.clone(), reason.clone());
                let msg = connection.to_string();
                prop_assert!(msg.contains(&endpoint));
                prop_assert!(msg.contains(&reason));

                let decode = LinkError::decode("header", details.clone());
                prop_assert!(decode.to_string().contains(&details));

                let unknown = LinkError::UnknownMessageType { kind: kind.clone() };
                prop_assert!(unknown.to_string().contains(&kind));

                let event = LinkError::UnknownEventType { code };
                prop_assert!(event.to_string().contains(&code.to_string()));

                let received = expected + gap;
                let gap_error = LinkError::SequenceGap { expected, received };
                let gap_msg = gap_error.to_string();
                prop_assert!(gap_msg.contains(&expected.to_string()));
                prop_assert!(gap_msg.contains(&received.to_string()));
            }

            #[test]
            fn only_transport_errors_are_fatal(details in ".*") {
                prop_assert!(LinkError::transport("recv", details.clone()).is_fatal());
                prop_assert!(!LinkError::decode("recv", details.clone()).is_fatal());
                prop_assert!(!LinkError::protocol_violation(details.clone()).is_fatal());
                prop_assert!(!LinkError::config(details).is_fatal());
            }
        }
    }

    #[test]
    fn heartbeat_timeout_display_distinguishes_severity() {
        let soft = LinkError::HeartbeatTimeout { elapsed: Duration::from_secs(3), hard: false };
        let hard = LinkError::HeartbeatTimeout { elapsed: Duration::from_secs(11), hard: true };

        assert!(soft.to_string().contains("retrying"));
        assert!(hard.to_string().contains("connection lost"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<LinkError>();

        let error = LinkError::connection_failed("tcp://localhost:5556", "refused");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn source_is_preserved_for_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = LinkError::connection_failed_with_source(
            "tcp://localhost:5557",
            "command channel",
            Box::new(io),
        );

        let source = std::error::Error::source(&error).expect("source should be kept");
        assert_eq!(source.to_string(), "refused");
    }

    #[test]
    fn recovery_methods_work() {
        let errors = [
            LinkError::connection_failed("tcp://localhost:5556", "refused"),
            LinkError::transport("recv", "closed"),
            LinkError::decode("header", "bad json"),
            LinkError::protocol_violation("awaiting reply"),
            LinkError::UnknownMessageType { kind: "unknown".into() },
        ];

        for error in &errors {
            let suggestions = error.recovery_suggestions();
            assert!(!suggestions.is_empty(), "{error} should offer guidance");
            for suggestion in suggestions {
                assert!(suggestion.len() > 5);
            }
        }

        assert!(errors[0].is_retryable());
        assert!(!errors[2].is_retryable());
    }

    #[test]
    fn from_io_error_maps_to_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing config");
        let err: LinkError = io_err.into();

        match err {
            LinkError::File { source, .. } => assert_eq!(source.to_string(), "missing config"),
            other => panic!("Expected File error variant, got {other:?}"),
        }
    }
}
