//! Configuration for a chat core instance.

use parley_delivery::RetryPolicy;
use parley_store::DEFAULT_IDENTITY_SLOT;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Configuration for [`crate::ChatCore`].
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Publish retry behavior.
    pub retry: RetryPolicy,
    /// Deployment-wide material mixed into every conversation key. All
    /// participants must agree on it.
    pub key_material: String,
    /// Replay transport history when a conversation is first created or
    /// joined.
    pub replay_on_subscribe: bool,
    /// Identity store slot.
    pub identity_slot: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            key_material: String::new(),
            replay_on_subscribe: true,
            identity_slot: DEFAULT_IDENTITY_SLOT.to_string(),
        }
    }
}

impl ChatConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn key_material_bytes(&self) -> &[u8] {
        self.key_material.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.identity_slot, "default");
        assert!(config.key_material.is_empty());
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.deadline_ms, Some(20_000));
    }

    #[test]
    fn test_partial_json() {
        let config = ChatConfig::from_json_str(
            r#"{ "key_material": "team-secret", "retry": { "max_attempts": 2 } }"#,
        )
        .unwrap();

        assert_eq!(config.key_material_bytes(), b"team-secret");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert!(config.replay_on_subscribe);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            ChatConfig::from_json_str("{ not json"),
            Err(ChatError::Config(_))
        ));
    }
}
