// src/lib.rs

//! A dialogue protocol engine: strict, id-numbered request/reply exchanges
//! between two agents, validated against a caller-supplied set of
//! performative rules. See [`dialogos`] for the module layout.

pub mod dialogos;

// Re-exporting the types most callers need at the crate root, so
// `dialogos::Dialogues` works without navigating the full module path.
pub use crate::dialogos::config::EngineConfig;
pub use crate::dialogos::coordinator::{Dialogues, RoleFromFirstMessage};
pub use crate::dialogos::dialogue::{Dialogue, DialogueState, Role, TerminalCallback};
pub use crate::dialogos::error::DialogueError;
pub use crate::dialogos::identifiers::{
    Address, DialogueLabel, DialogueLabelJson, DialogueReference, MessageId, Performative, Target,
};
pub use crate::dialogos::message::{ProtocolMessage, ProtocolMessageBuilder};
pub use crate::dialogos::nonce::generate_nonce;
pub use crate::dialogos::rules::{Rules, RulesBuilder};
pub use crate::dialogos::storage::Storage;
pub use crate::dialogos::value::Value;
