//! [`Dialogue`]: the per-conversation state machine — ordered history,
//! message numbering, validation against [`Rules`], and terminal callbacks.
//!
//! This is the heart of the engine. Appends are transactional (validation
//! runs to completion before any history mutation), ids increase by exactly
//! one per direction, and a dialogue that has seen a terminal performative
//! rejects all further updates.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dialogos::error::DialogueError;
use crate::dialogos::identifiers::{Address, DialogueLabel, MessageId, Performative};
use crate::dialogos::message::{ProtocolMessage, ProtocolMessageBuilder};
use crate::dialogos::rules::Rules;
use crate::dialogos::value::Value;

/// Which side of the protocol this agent is playing in a given dialogue.
/// Assigned once, at construction, by the caller-supplied
/// `role_from_first_message` function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The first role defined by the protocol (commonly the dialogue
    /// starter, e.g. an initiator/requester).
    Role1,
    /// The second role defined by the protocol (commonly the responder).
    Role2,
}

/// The three states a [`Dialogue`] can be in, derived (not stored directly)
/// from `last_message_id` and whether a terminal performative has been
/// appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    /// No messages have been appended yet.
    Empty,
    /// At least one message has been appended and no terminal performative
    /// has been seen.
    Open,
    /// A terminal performative has been appended. Absorbing: no further
    /// `update` calls are accepted.
    Terminal,
}

/// A callback invoked exactly once, in registration order, the first time a
/// dialogue reaches a terminal performative.
pub type TerminalCallback = Box<dyn Fn(&Dialogue)>;

/// A single, strictly ordered pairwise conversation between a self agent and
/// one counterparty, governed by a [`Rules`] instance.
pub struct Dialogue {
    label: DialogueLabel,
    role: Role,
    self_address: Address,
    outgoing: Vec<ProtocolMessage>,
    incoming: Vec<ProtocolMessage>,
    last_message_id: MessageId,
    ordered_ids: Vec<MessageId>,
    rules: Arc<Rules>,
    terminal_callbacks: Vec<TerminalCallback>,
    terminal: bool,
}

impl Dialogue {
    /// Creates a new, empty dialogue under the given label.
    pub fn new(label: DialogueLabel, self_address: Address, role: Role, rules: Arc<Rules>) -> Self {
        Dialogue {
            label,
            role,
            self_address,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            last_message_id: MessageId::new(0),
            ordered_ids: Vec::new(),
            rules,
            terminal_callbacks: Vec::new(),
            terminal: false,
        }
    }

    /// This dialogue's label.
    pub fn label(&self) -> &DialogueLabel {
        &self.label
    }

    /// This dialogue's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The address this engine instance plays in this dialogue.
    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    /// The rule set governing this dialogue.
    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    /// The most recently appended message's id, or `0` if the dialogue is
    /// empty.
    pub fn last_message_id(&self) -> MessageId {
        self.last_message_id
    }

    /// Registers a callback to be invoked exactly once, the first time this
    /// dialogue reaches a terminal performative. Callbacks run in
    /// registration order. Must not call back into this dialogue's
    /// [`Dialogue::update`] — re-entrancy is not supported.
    pub fn add_terminal_callback(&mut self, callback: TerminalCallback) {
        self.terminal_callbacks.push(callback);
    }

    /// True iff no messages have been appended to this dialogue yet.
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }

    /// True iff a terminal performative has been appended.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// This dialogue's current state, derived from its history.
    pub fn state(&self) -> DialogueState {
        if self.terminal {
            DialogueState::Terminal
        } else if self.is_empty() {
            DialogueState::Empty
        } else {
            DialogueState::Open
        }
    }

    /// True iff this engine instance started this dialogue.
    pub fn is_self_initiated(&self) -> bool {
        self.label.starter_addr == self.self_address
    }

    /// The outgoing message history, in send order.
    pub fn outgoing(&self) -> &[ProtocolMessage] {
        &self.outgoing
    }

    /// The incoming message history, in arrival order.
    pub fn incoming(&self) -> &[ProtocolMessage] {
        &self.incoming
    }

    /// The full transcript in arrival order (the merge of
    /// [`Dialogue::outgoing`]/[`Dialogue::incoming`]).
    pub fn history(&self) -> impl Iterator<Item = &ProtocolMessage> + '_ {
        self.ordered_ids
            .iter()
            .filter_map(move |id| self.get_message_by_id(*id))
    }

    /// The last message received from the opponent, if any.
    pub fn last_incoming(&self) -> Option<&ProtocolMessage> {
        self.incoming.last()
    }

    /// The last message sent by self, if any.
    pub fn last_outgoing(&self) -> Option<&ProtocolMessage> {
        self.outgoing.last()
    }

    /// The most recently appended message overall, picking the incoming
    /// message if its id matches [`Dialogue::last_message_id`], otherwise
    /// falling back to the last outgoing message.
    pub fn last_message(&self) -> Option<&ProtocolMessage> {
        if let Some(incoming) = self.incoming.last() {
            if incoming.message_id() == self.last_message_id {
                return Some(incoming);
            }
        }
        self.outgoing.last()
    }

    /// Looks up the message with the given id. The id's sign picks the
    /// direction (outgoing iff `(id > 0) == is_self_initiated()`), and its
    /// magnitude is the 1-indexed position within that direction's history.
    pub fn get_message_by_id(&self, id: MessageId) -> Option<&ProtocolMessage> {
        if id.value() == 0 {
            return None;
        }
        let list = if (id.value() > 0) == self.is_self_initiated() {
            &self.outgoing
        } else {
            &self.incoming
        };
        let index = id.abs() as usize;
        list.get(index - 1)
    }

    /// True iff a message with the given id exists in this dialogue's
    /// history.
    pub fn has_message_id(&self, id: MessageId) -> bool {
        self.get_message_by_id(id).is_some()
    }

    /// The id the next message sent by self would carry.
    pub fn next_outgoing_id(&self) -> MessageId {
        let magnitude = match self.outgoing.last() {
            Some(m) => m.message_id().abs() + 1,
            None => MessageId::STARTING_MAGNITUDE,
        };
        let sign: i64 = if self.is_self_initiated() { 1 } else { -1 };
        MessageId::new(sign * magnitude)
    }

    /// The id the next message received from the opponent would carry.
    pub fn next_incoming_id(&self) -> MessageId {
        let magnitude = match self.incoming.last() {
            Some(m) => m.message_id().abs() + 1,
            None => MessageId::STARTING_MAGNITUDE,
        };
        let sign: i64 = if self.is_self_initiated() { -1 } else { 1 };
        MessageId::new(sign * magnitude)
    }

    /// The central state transition: validates `message` against this
    /// dialogue's label, history and rules, and — if valid — appends it.
    pub fn update(&mut self, mut message: ProtocolMessage) -> Result<(), DialogueError> {
        if self.terminal {
            return Err(DialogueError::ClosedDialogue);
        }

        if !message.has_sender() {
            message.set_sender(self.self_address.clone())?;
        }

        // Completing a handshake is the coordinator's job: it relabels the
        // dialogue (`update_label`) via `complete_dialogue_reference` before
        // routing the message here, so by this point `belonging` is expected
        // to already match `self.label` exactly.
        let belonging = self.belonging_label(&message);
        if belonging != self.label && belonging != self.label.incomplete_version() {
            log::warn!(
                "dialogue {}: rejecting message with non-belonging label {}",
                self.label,
                belonging
            );
            return Err(DialogueError::NotBelonging);
        }

        if self.is_empty() {
            self.basic_validate_initial(&message)?;
        } else {
            self.basic_validate_non_initial(&message)?;
        }

        let outgoing_direction = message.sender() == Some(&self.self_address);
        if outgoing_direction {
            self.outgoing.push(message.clone());
        } else {
            self.incoming.push(message.clone());
        }
        self.last_message_id = message.message_id();
        self.ordered_ids.push(message.message_id());

        log::trace!(
            "dialogue {}: accepted message id={} target={} performative={}",
            self.label,
            message.message_id(),
            message.target(),
            message.performative()
        );

        if self.rules.is_terminal(message.performative()) {
            self.terminal = true;
            log::debug!("dialogue {}: reached terminal state", self.label);
            let callbacks = std::mem::take(&mut self.terminal_callbacks);
            for callback in &callbacks {
                callback(self);
            }
            self.terminal_callbacks = callbacks;
        }

        Ok(())
    }

    /// Constructs and appends a reply to `target_message`/`target_id` (at
    /// most one of which should be given; both must agree if both are
    /// given; neither means "reply to the last message").
    pub fn reply(
        &mut self,
        performative: Performative,
        target_message: Option<&ProtocolMessage>,
        target_id: Option<MessageId>,
        body: BTreeMap<String, Value>,
    ) -> Result<ProtocolMessage, DialogueError> {
        if self.is_empty() {
            return Err(DialogueError::EmptyDialogue);
        }

        let target = match (target_message, target_id) {
            (None, None) => self
                .last_message()
                .map(|m| m.message_id())
                .ok_or(DialogueError::EmptyDialogue)?,
            (None, Some(id)) => id,
            (Some(msg), None) => msg.message_id(),
            (Some(msg), Some(id)) => {
                if msg.message_id() != id {
                    return Err(DialogueError::Inconsistent);
                }
                id
            }
        };

        if !self.has_message_id(target) {
            return Err(DialogueError::NoSuchTarget(target));
        }

        let message = ProtocolMessageBuilder::new()
            .sender(self.self_address.clone())
            .to(self.label.opponent_addr.clone())
            .dialogue_reference(self.label.reference.clone())
            .message_id(self.next_outgoing_id())
            .target(target.as_target())
            .performative(performative)
            .body(body)
            .build()?;

        self.update(message.clone())?;
        Ok(message)
    }

    /// Rewrites this dialogue's label, e.g. when the responder's first reply
    /// completes the dialogue reference during handshake. Fails if both the
    /// current and incoming `responder_ref` are unassigned, since that is
    /// not a completion of the handshake.
    pub fn update_label(&mut self, final_label: DialogueLabel) -> Result<(), DialogueError> {
        if self.label.reference.unassigned_responder() && final_label.reference.unassigned_responder()
        {
            return Err(DialogueError::CannotRelabel);
        }
        log::debug!("dialogue {}: relabeled to {}", self.label, final_label);
        self.label = final_label;
        Ok(())
    }

    fn belonging_label(&self, message: &ProtocolMessage) -> DialogueLabel {
        DialogueLabel::new(
            message.dialogue_reference().clone(),
            self.label.opponent_addr.clone(),
            self.label.starter_addr.clone(),
        )
    }

    fn basic_validate_initial(&self, m: &ProtocolMessage) -> Result<(), DialogueError> {
        if m.dialogue_reference().starter_ref != self.label.reference.starter_ref {
            return Err(DialogueError::InvalidStarterRef);
        }
        let expected = MessageId::new(MessageId::STARTING_MAGNITUDE);
        if m.message_id() != expected {
            return Err(DialogueError::InvalidMessageId {
                expected,
                got: m.message_id(),
            });
        }
        if !m.target().is_starting() {
            return Err(DialogueError::InvalidTarget(
                "the first message of a dialogue must target 0".to_string(),
            ));
        }
        if !self.rules.is_initial(m.performative()) {
            return Err(DialogueError::InvalidPerformative(format!(
                "'{}' is not an initial performative",
                m.performative()
            )));
        }
        Ok(())
    }

    fn basic_validate_non_initial(&self, m: &ProtocolMessage) -> Result<(), DialogueError> {
        if m.dialogue_reference().starter_ref != self.label.reference.starter_ref {
            return Err(DialogueError::InvalidStarterRef);
        }
        self.validate_message_id(m)?;
        self.validate_message_target(m)?;
        Ok(())
    }

    fn validate_message_id(&self, m: &ProtocolMessage) -> Result<(), DialogueError> {
        let outgoing_direction = m.sender() == Some(&self.self_address);
        let expected = if outgoing_direction {
            self.next_outgoing_id()
        } else {
            self.next_incoming_id()
        };
        if m.message_id() != expected {
            return Err(DialogueError::InvalidMessageId {
                expected,
                got: m.message_id(),
            });
        }
        Ok(())
    }

    fn validate_message_target(&self, m: &ProtocolMessage) -> Result<(), DialogueError> {
        let target = m.target();

        // Target 0 is reserved for the dialogue's true opening message,
        // handled by `basic_validate_initial`. A direction's own first
        // message (id magnitude 1) still targets whatever it replies to.
        if target.is_starting() {
            return Err(DialogueError::InvalidTarget(
                "a non-initial message must have a nonzero target".to_string(),
            ));
        }

        let last_incoming_abs = self.incoming.last().map(|m| m.message_id().abs()).unwrap_or(0);
        let last_outgoing_abs = self.outgoing.last().map(|m| m.message_id().abs()).unwrap_or(0);
        let max_known = last_incoming_abs.max(last_outgoing_abs);
        if target.abs() > max_known {
            return Err(DialogueError::InvalidTarget(format!(
                "target {} exceeds the highest known message id {}",
                target, max_known
            )));
        }

        let target_message = self
            .get_message_by_id(target.as_message_id())
            .ok_or_else(|| {
                DialogueError::InvalidTarget(format!("no message with id {} in this dialogue", target))
            })?;

        let allowed = self.rules.valid_replies(target_message.performative());
        if !allowed.contains(m.performative()) {
            return Err(DialogueError::InvalidPerformative(format!(
                "'{}' is not a valid reply to '{}'",
                m.performative(),
                target_message.performative()
            )));
        }

        Ok(())
    }
}
