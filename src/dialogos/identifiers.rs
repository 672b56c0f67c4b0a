//! Composite identifier types: [`Address`], [`Performative`], [`MessageId`],
//! [`Target`], [`DialogueReference`] and [`DialogueLabel`].
//!
//! All types here are immutable values once constructed — relabeling a
//! dialogue (see [`crate::dialogue::Dialogue::update_label`]) replaces the
//! label wholesale rather than mutating one of its fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dialogos::error::DialogueError;

/// An opaque string identifying an agent. Not interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Wraps a raw address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Address(addr.into())
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Address(s)
    }
}

/// An opaque string naming a message kind within one protocol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Performative(String);

impl Performative {
    /// Wraps a raw performative name.
    pub fn new(name: impl Into<String>) -> Self {
        Performative(name.into())
    }

    /// Borrows the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Performative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Performative {
    fn from(s: &str) -> Self {
        Performative(s.to_string())
    }
}

impl From<String> for Performative {
    fn from(s: String) -> Self {
        Performative(s)
    }
}

/// A nonzero signed message identifier.
///
/// Sign convention: positive = sent by the dialogue starter, negative = sent
/// by the responder. The first message on either side has magnitude `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(i64);

impl MessageId {
    /// The id of the very first message of a dialogue, unsigned magnitude.
    pub const STARTING_MAGNITUDE: i64 = 1;

    /// Wraps a raw signed id. Does not itself enforce non-zero-ness; callers
    /// that need the `Target` sentinel use [`Target`] instead.
    pub fn new(value: i64) -> Self {
        MessageId(value)
    }

    /// The raw signed value.
    pub fn value(self) -> i64 {
        self.0
    }

    /// The unsigned magnitude.
    pub fn abs(self) -> i64 {
        self.0.abs()
    }

    /// Whether this id was sent by the starter (positive sign).
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// This id's magnitude, reinterpreted as a [`Target`] (used when a
    /// message is later referenced as the target of a reply).
    pub fn as_target(self) -> Target {
        Target(self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A reference to the message a reply addresses. `0` is reserved for the
/// very first message of a dialogue, which targets nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target(i64);

impl Target {
    /// The sentinel target carried by the first message of a dialogue.
    pub const STARTING_TARGET: Target = Target(0);

    /// Wraps a raw signed target value.
    pub fn new(value: i64) -> Self {
        Target(value)
    }

    /// The raw signed value.
    pub fn value(self) -> i64 {
        self.0
    }

    /// The unsigned magnitude.
    pub fn abs(self) -> i64 {
        self.0.abs()
    }

    /// Whether this is the starting-target sentinel (`0`).
    pub fn is_starting(self) -> bool {
        self.0 == 0
    }

    /// Reinterprets this target's value as a [`MessageId`] (used to look up
    /// the message it refers to).
    pub fn as_message_id(self) -> MessageId {
        MessageId(self.0)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sentinel value for an unassigned reference half.
pub const UNASSIGNED: &str = "";

/// An ordered pair `(starter_ref, responder_ref)` of opaque reference
/// strings. Either half may be the unassigned sentinel (empty string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DialogueReference {
    /// The reference half assigned by the dialogue's starter.
    pub starter_ref: String,
    /// The reference half assigned by the dialogue's responder.
    pub responder_ref: String,
}

impl DialogueReference {
    /// Builds a reference from two halves.
    pub fn new(starter_ref: impl Into<String>, responder_ref: impl Into<String>) -> Self {
        DialogueReference {
            starter_ref: starter_ref.into(),
            responder_ref: responder_ref.into(),
        }
    }

    /// A reference with an assigned starter half and an unassigned responder
    /// half — the shape used when a self-initiated dialogue is first
    /// created.
    pub fn incomplete(starter_ref: impl Into<String>) -> Self {
        DialogueReference {
            starter_ref: starter_ref.into(),
            responder_ref: UNASSIGNED.to_string(),
        }
    }

    /// True when both halves are assigned.
    pub fn is_complete(&self) -> bool {
        !self.starter_ref.is_empty() && !self.responder_ref.is_empty()
    }

    /// True when the responder half specifically is unassigned.
    pub fn unassigned_responder(&self) -> bool {
        self.responder_ref.is_empty()
    }

    /// Returns a copy with `responder_ref` cleared back to unassigned.
    pub fn incomplete_version(&self) -> Self {
        DialogueReference {
            starter_ref: self.starter_ref.clone(),
            responder_ref: UNASSIGNED.to_string(),
        }
    }
}

/// A triple `(reference, opponent_address, starter_address)` identifying a
/// dialogue. Two labels are equal iff all four underlying strings match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DialogueLabel {
    /// The dialogue reference half of the label.
    pub reference: DialogueReference,
    /// The address of the opponent in this dialogue.
    pub opponent_addr: Address,
    /// The address of whichever side started this dialogue.
    pub starter_addr: Address,
}

impl DialogueLabel {
    /// Builds a label from its three constituent parts.
    pub fn new(reference: DialogueReference, opponent_addr: Address, starter_addr: Address) -> Self {
        DialogueLabel {
            reference,
            opponent_addr,
            starter_addr,
        }
    }

    /// Returns a copy with `responder_ref` replaced by the unassigned
    /// sentinel.
    pub fn incomplete_version(&self) -> Self {
        DialogueLabel {
            reference: self.reference.incomplete_version(),
            opponent_addr: self.opponent_addr.clone(),
            starter_addr: self.starter_addr.clone(),
        }
    }

    /// True iff this label's reference has both halves assigned.
    pub fn is_complete(&self) -> bool {
        self.reference.is_complete()
    }
}

impl fmt::Display for DialogueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.reference.starter_ref,
            self.reference.responder_ref,
            self.opponent_addr,
            self.starter_addr
        )
    }
}

impl FromStr for DialogueLabel {
    type Err = DialogueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != 4 {
            return Err(DialogueError::InvalidTarget(format!(
                "dialogue label must split into exactly 4 underscore-separated tokens, got {}",
                parts.len()
            )));
        }
        Ok(DialogueLabel {
            reference: DialogueReference::new(parts[0], parts[1]),
            opponent_addr: Address::new(parts[2]),
            starter_addr: Address::new(parts[3]),
        })
    }
}

/// JSON-serializable form of a [`DialogueLabel`], with the exact key names
/// the wire form uses. Key order on parse is insignificant; unknown keys
/// fail (a missing key is absent, not defaulted) to match the "parsing is
/// lenient to key order, but a missing key fails rather than defaulting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueLabelJson {
    /// The starter's half of the dialogue reference.
    pub dialogue_starter_reference: String,
    /// The responder's half of the dialogue reference.
    pub dialogue_responder_reference: String,
    /// The opponent's address.
    pub dialogue_opponent_addr: String,
    /// The starter's address.
    pub dialogue_starter_addr: String,
}

impl From<&DialogueLabel> for DialogueLabelJson {
    fn from(label: &DialogueLabel) -> Self {
        DialogueLabelJson {
            dialogue_starter_reference: label.reference.starter_ref.clone(),
            dialogue_responder_reference: label.reference.responder_ref.clone(),
            dialogue_opponent_addr: label.opponent_addr.as_str().to_string(),
            dialogue_starter_addr: label.starter_addr.as_str().to_string(),
        }
    }
}

impl From<DialogueLabelJson> for DialogueLabel {
    fn from(json: DialogueLabelJson) -> Self {
        DialogueLabel {
            reference: DialogueReference::new(
                json.dialogue_starter_reference,
                json.dialogue_responder_reference,
            ),
            opponent_addr: Address::new(json.dialogue_opponent_addr),
            starter_addr: Address::new(json.dialogue_starter_addr),
        }
    }
}

impl DialogueLabel {
    /// Serializes this label to its JSON object form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(DialogueLabelJson::from(self))
            .expect("DialogueLabelJson serialization is infallible")
    }

    /// Parses a label from its JSON object form. Fails if any of the four
    /// keys is missing.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DialogueError> {
        let json: DialogueLabelJson = serde_json::from_value(value.clone()).map_err(|e| {
            DialogueError::InvalidTarget(format!("malformed dialogue label json: {}", e))
        })?;
        Ok(json.into())
    }
}
