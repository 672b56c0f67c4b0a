//! Configuration for a [`Dialogues`](crate::dialogos::coordinator::Dialogues) instance.
//!
//! Kept intentionally minimal: plain data the caller constructs directly,
//! no file/env parsing dependency.
//!
//! # Example
//!
//! ```
//! use dialogos::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert!(config.keep_terminal);
//! assert_eq!(config.dialogue_name, "default");
//! ```

/// Configuration governing how a [`Dialogues`](crate::dialogos::coordinator::Dialogues)
/// coordinator retains and logs the dialogues it manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Whether dialogues are retained in a terminal index after reaching a
    /// terminal performative (`true`), or evicted from storage entirely
    /// (`false`).
    pub keep_terminal: bool,
    /// A human-readable name for this engine instance, used only as logging
    /// context (e.g. `"fipa-cfp"` when multiple `Dialogues` coordinators
    /// exist in one process, one per protocol).
    pub dialogue_name: String,
}

impl Default for EngineConfig {
    /// Creates a config that retains terminal dialogues and labels log lines
    /// with `"default"`.
    fn default() -> Self {
        EngineConfig {
            keep_terminal: true,
            dialogue_name: "default".to_string(),
        }
    }
}
