//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the workspace. The media node
//! shared secret is the main customer: it is loaded from configuration, kept
//! inside a [`SecretString`], and only exposed at the moment the WebSocket
//! handshake header is built.
//!
//! `SecretString` implements `Debug` with redaction, so structs that derive
//! `Debug` (configuration, node descriptors) stay safe to log. Values are
//! zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct NodeCredentials {
//!     node_id: String,
//!     secret: SecretString,
//! }
//!
//! let creds = NodeCredentials {
//!     node_id: "mn-1".to_string(),
//!     secret: SecretString::from("shared-secret"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("shared-secret"));
//! assert_eq!(creds.secret.expose_secret(), "shared-secret");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("node-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("node-secret"));
    }

    #[test]
    fn test_deserialized_node_secret_is_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct Node {
            hostname: String,
            secret: SecretString,
        }

        let json = r#"{"hostname": "mn1.example.com", "secret": "s3cr3t"}"#;
        let node: Node = serde_json::from_str(json).expect("deserialize");

        assert_eq!(node.secret.expose_secret(), "s3cr3t");
        let debug = format!("{node:?}");
        assert!(debug.contains("mn1.example.com"));
        assert!(!debug.contains("s3cr3t"));
    }

    #[test]
    fn test_clone_keeps_value() {
        let secret = SecretString::from("cloneable");
        assert_eq!(secret.clone().expose_secret(), "cloneable");
    }
}
