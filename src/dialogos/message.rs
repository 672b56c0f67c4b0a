//! [`ProtocolMessage`]: the read-only message contract with one-shot
//! `sender`/`to` setters.

use std::collections::BTreeMap;

use crate::dialogos::error::DialogueError;
use crate::dialogos::identifiers::{Address, DialogueReference, MessageId, Performative, Target};
use crate::dialogos::value::Value;

/// A single message exchanged within a dialogue.
///
/// `sender` and `to` start out possibly empty (the unset sentinel) and may
/// each be written exactly once via [`ProtocolMessage::set_sender`] /
/// [`ProtocolMessage::set_to`] — a second write to either fails with
/// [`DialogueError::AlreadySet`]. Every other field is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    sender: Option<Address>,
    to: Option<Address>,
    dialogue_reference: DialogueReference,
    message_id: MessageId,
    target: Target,
    performative: Performative,
    body: BTreeMap<String, Value>,
}

impl ProtocolMessage {
    /// Constructs a new message. `sender`/`to` start unset; fill them in
    /// with [`ProtocolMessage::set_sender`]/[`ProtocolMessage::set_to`] or
    /// supply them up front via [`ProtocolMessageBuilder`].
    pub fn new(
        dialogue_reference: DialogueReference,
        message_id: MessageId,
        target: Target,
        performative: Performative,
        body: BTreeMap<String, Value>,
    ) -> Self {
        ProtocolMessage {
            sender: None,
            to: None,
            dialogue_reference,
            message_id,
            target,
            performative,
            body,
        }
    }

    /// The sender address, if set.
    pub fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// The recipient address, if set.
    pub fn to(&self) -> Option<&Address> {
        self.to.as_ref()
    }

    /// True iff [`ProtocolMessage::sender`] is set.
    pub fn has_sender(&self) -> bool {
        self.sender.is_some()
    }

    /// True iff [`ProtocolMessage::to`] is set.
    pub fn has_to(&self) -> bool {
        self.to.is_some()
    }

    /// Sets the sender address. Fails with [`DialogueError::AlreadySet`] if
    /// already set.
    pub fn set_sender(&mut self, sender: Address) -> Result<(), DialogueError> {
        if self.sender.is_some() {
            return Err(DialogueError::AlreadySet("sender"));
        }
        self.sender = Some(sender);
        Ok(())
    }

    /// Sets the recipient address. Fails with [`DialogueError::AlreadySet`]
    /// if already set.
    pub fn set_to(&mut self, to: Address) -> Result<(), DialogueError> {
        if self.to.is_some() {
            return Err(DialogueError::AlreadySet("to"));
        }
        self.to = Some(to);
        Ok(())
    }

    /// The dialogue reference this message carries.
    pub fn dialogue_reference(&self) -> &DialogueReference {
        &self.dialogue_reference
    }

    /// This message's id.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The id of the message this one targets (`0` for a dialogue's first
    /// message).
    pub fn target(&self) -> Target {
        self.target
    }

    /// This message's performative.
    pub fn performative(&self) -> &Performative {
        &self.performative
    }

    /// The opaque body map.
    pub fn body(&self) -> &BTreeMap<String, Value> {
        &self.body
    }

    /// Looks up a single field in the body.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// Builder for [`ProtocolMessage`] that lets callers supply `sender`/`to` up
/// front instead of going through the one-shot setters — the common path for
/// messages the coordinator or `Dialogue::reply` constructs locally.
#[derive(Debug, Clone, Default)]
pub struct ProtocolMessageBuilder {
    sender: Option<Address>,
    to: Option<Address>,
    dialogue_reference: Option<DialogueReference>,
    message_id: Option<MessageId>,
    target: Option<Target>,
    performative: Option<Performative>,
    body: BTreeMap<String, Value>,
}

impl ProtocolMessageBuilder {
    /// Starts a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender address.
    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Sets the recipient address.
    pub fn to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    /// Sets the dialogue reference.
    pub fn dialogue_reference(mut self, reference: DialogueReference) -> Self {
        self.dialogue_reference = Some(reference);
        self
    }

    /// Sets the message id.
    pub fn message_id(mut self, id: MessageId) -> Self {
        self.message_id = Some(id);
        self
    }

    /// Sets the target.
    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the performative.
    pub fn performative(mut self, performative: Performative) -> Self {
        self.performative = Some(performative);
        self
    }

    /// Sets the full body map.
    pub fn body(mut self, body: BTreeMap<String, Value>) -> Self {
        self.body = body;
        self
    }

    /// Sets a single body field.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.body.insert(name.into(), value);
        self
    }

    /// Finishes building. `sender`/`to` are applied via the one-shot setters
    /// internally, so any logic relying on them being write-once still holds
    /// for messages assembled this way.
    pub fn build(self) -> Result<ProtocolMessage, DialogueError> {
        let mut message = ProtocolMessage::new(
            self.dialogue_reference
                .unwrap_or_else(|| DialogueReference::new("", "")),
            self.message_id.unwrap_or(MessageId::new(0)),
            self.target.unwrap_or(Target::STARTING_TARGET),
            self.performative
                .unwrap_or_else(|| Performative::new("")),
            self.body,
        );
        if let Some(sender) = self.sender {
            message.set_sender(sender)?;
        }
        if let Some(to) = self.to {
            message.set_to(to)?;
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProtocolMessage {
        ProtocolMessage::new(
            DialogueReference::new("n1", ""),
            MessageId::new(1),
            Target::STARTING_TARGET,
            Performative::new("cfp"),
            BTreeMap::new(),
        )
    }

    #[test]
    fn sender_is_write_once() {
        let mut msg = sample();
        assert!(!msg.has_sender());
        msg.set_sender(Address::from("A")).unwrap();
        assert!(msg.has_sender());
        let err = msg.set_sender(Address::from("A2")).unwrap_err();
        assert_eq!(err, DialogueError::AlreadySet("sender"));
    }

    #[test]
    fn to_is_write_once() {
        let mut msg = sample();
        msg.set_to(Address::from("B")).unwrap();
        let err = msg.set_to(Address::from("B2")).unwrap_err();
        assert_eq!(err, DialogueError::AlreadySet("to"));
    }

    #[test]
    fn get_field_looks_up_body() {
        let mut body = BTreeMap::new();
        body.insert("price".to_string(), Value::Int(42));
        let msg = ProtocolMessage::new(
            DialogueReference::new("n1", ""),
            MessageId::new(1),
            Target::STARTING_TARGET,
            Performative::new("propose"),
            body,
        );
        assert_eq!(msg.get_field("price"), Some(&Value::Int(42)));
        assert_eq!(msg.get_field("missing"), None);
    }

    #[test]
    fn builder_applies_one_shot_setters() {
        let msg = ProtocolMessageBuilder::new()
            .sender(Address::from("A"))
            .to(Address::from("B"))
            .dialogue_reference(DialogueReference::new("n1", ""))
            .message_id(MessageId::new(1))
            .target(Target::STARTING_TARGET)
            .performative(Performative::new("cfp"))
            .build()
            .unwrap();
        assert_eq!(msg.sender(), Some(&Address::from("A")));
        assert_eq!(msg.to(), Some(&Address::from("B")));
    }
}
