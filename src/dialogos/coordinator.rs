//! [`Dialogues`]: the factory and router that creates dialogues, completes
//! references during handshake, and dispatches inbound messages to the
//! right [`Dialogue`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dialogos::config::EngineConfig;
use crate::dialogos::dialogue::{Dialogue, Role};
use crate::dialogos::error::DialogueError;
use crate::dialogos::identifiers::{Address, DialogueLabel, DialogueReference, MessageId, Performative, Target};
use crate::dialogos::message::{ProtocolMessage, ProtocolMessageBuilder};
use crate::dialogos::nonce::generate_nonce;
use crate::dialogos::rules::Rules;
use crate::dialogos::storage::Storage;
use crate::dialogos::value::Value;

/// A function deciding which [`Role`] this engine instance plays in a
/// dialogue, given its first message and the counterparty's address.
pub type RoleFromFirstMessage = Box<dyn Fn(&ProtocolMessage, &Address) -> Role>;

/// Owns one protocol's [`Storage`] and routes messages into it.
///
/// One `Dialogues` per protocol per process; this type assumes exclusive,
/// single-threaded access per instance.
pub struct Dialogues {
    self_address: Address,
    role_from_first_message: RoleFromFirstMessage,
    rules: Arc<Rules>,
    storage: Storage,
}

impl Dialogues {
    /// Constructs a coordinator governing dialogues under `rules`, owning a
    /// fresh [`Storage`] configured by `config`.
    pub fn new(
        self_address: Address,
        role_from_first_message: RoleFromFirstMessage,
        config: EngineConfig,
        rules: Rules,
    ) -> Self {
        Dialogues {
            self_address,
            role_from_first_message,
            rules: Arc::new(rules),
            storage: Storage::new(config),
        }
    }

    /// Read-only access to the underlying storage (labels, terminal index,
    /// per-opponent lookups).
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Looks up the dialogue currently stored under `label`.
    pub fn get(&self, label: &DialogueLabel) -> Option<&Dialogue> {
        self.storage.get(label)
    }

    /// Every dialogue currently stored against `addr`, in insertion order.
    pub fn dialogues_by_opponent(&self, addr: &Address) -> Vec<&Dialogue> {
        self.storage.dialogues_by_opponent(addr)
    }

    /// Starts a fresh self-initiated dialogue with `counterparty`, opening
    /// it with `performative`/`body`. Returns the constructed initial
    /// message; look the dialogue up afterwards via
    /// [`Dialogues::get_dialogue`].
    pub fn create(
        &mut self,
        counterparty: Address,
        performative: Performative,
        body: BTreeMap<String, Value>,
    ) -> Result<ProtocolMessage, DialogueError> {
        let reference = DialogueReference::incomplete(generate_nonce());
        let message = ProtocolMessageBuilder::new()
            .sender(self.self_address.clone())
            .to(counterparty.clone())
            .dialogue_reference(reference.clone())
            .message_id(MessageId::new(MessageId::STARTING_MAGNITUDE))
            .target(Target::STARTING_TARGET)
            .performative(performative)
            .body(body)
            .build()?;

        let label = self.create_self_initiated(counterparty, reference, &message)?;

        if let Err(err) = self.apply(&label, message.clone()) {
            log::warn!("dialogues: rolling back self-initiated dialogue {}: {}", label, err);
            self.storage.remove(&label);
            return Err(err);
        }

        Ok(message)
    }

    /// Routes an inbound message to the dialogue it belongs to, creating one
    /// if this is the first message of a new opponent-initiated dialogue.
    ///
    /// Preconditions (checked): `inbound.has_sender() && inbound.sender() !=
    /// self_address && inbound.has_to() && inbound.to() == self_address`.
    pub fn update(&mut self, inbound: ProtocolMessage) -> Result<Option<DialogueLabel>, DialogueError> {
        if !inbound.has_sender() || inbound.sender() == Some(&self.self_address) {
            return Err(DialogueError::NotBelonging);
        }
        if !inbound.has_to() || inbound.to() != Some(&self.self_address) {
            return Err(DialogueError::NotBelonging);
        }

        let starter_assigned = !inbound.dialogue_reference().starter_ref.is_empty();
        let responder_assigned = !inbound.dialogue_reference().responder_ref.is_empty();
        let is_starting_id = inbound.message_id().abs() == MessageId::STARTING_MAGNITUDE;

        if !starter_assigned {
            log::warn!("dialogues: rejecting message with unassigned starter_ref");
            return Ok(None);
        }

        // Both halves assigned: a handshake-completing message. Relabel the
        // matching incomplete dialogue (if any) before looking it up.
        if responder_assigned {
            self.complete_dialogue_reference(&inbound);
        }

        // Whether this continues a dialogue we already know about — either
        // self-initiated (awaiting the opponent's reply) or already-created
        // opponent-initiated — takes priority over treating it as an opener:
        // an opponent's first reply to *our* dialogue carries the same
        // (starter assigned, responder unassigned, id magnitude 1) shape as
        // a brand new opponent-initiated dialogue would.
        let (label, newly_created) = match self.get_dialogue(&inbound) {
            Some(label) => (label, false),
            None => {
                if responder_assigned || !is_starting_id {
                    return Ok(None);
                }
                let opponent = inbound.sender().cloned().unwrap_or_else(|| Address::new(""));
                let label = self.create_opponent_initiated(
                    opponent,
                    inbound.dialogue_reference().clone(),
                    &inbound,
                )?;
                (label, true)
            }
        };

        if let Err(err) = self.apply(&label, inbound) {
            if newly_created {
                log::warn!("dialogues: rolling back opponent-initiated dialogue {}: {}", label, err);
                self.storage.remove(&label);
            }
            return Err(err);
        }

        Ok(Some(label))
    }

    /// Constructs and appends a reply within an existing dialogue, applying
    /// storage's terminal-state bookkeeping afterward.
    pub fn reply(
        &mut self,
        label: &DialogueLabel,
        performative: Performative,
        target_id: Option<MessageId>,
        body: BTreeMap<String, Value>,
    ) -> Result<ProtocolMessage, DialogueError> {
        let dialogue = self
            .storage
            .get_mut(label)
            .ok_or(DialogueError::NotBelonging)?;
        let message = dialogue.reply(performative, None, target_id, body)?;
        self.storage.settle(label);
        Ok(message)
    }

    fn apply(&mut self, label: &DialogueLabel, message: ProtocolMessage) -> Result<(), DialogueError> {
        let dialogue = self
            .storage
            .get_mut(label)
            .ok_or(DialogueError::NotBelonging)?;
        dialogue.update(message)?;
        self.storage.settle(label);
        Ok(())
    }

    /// Builds both candidate labels for `message` (self-initiated and
    /// opponent-initiated), rewrites each via [`Storage::latest_label`], and
    /// returns whichever is present in storage. A self-initiated match wins
    /// if both are present, which the invariants say should not occur.
    pub fn get_dialogue(&self, message: &ProtocolMessage) -> Option<DialogueLabel> {
        let opponent = message.sender().cloned().unwrap_or_else(|| Address::new(""));

        let self_initiated_candidate = DialogueLabel::new(
            message.dialogue_reference().clone(),
            opponent.clone(),
            self.self_address.clone(),
        );
        let opponent_initiated_candidate =
            DialogueLabel::new(message.dialogue_reference().clone(), opponent.clone(), opponent);

        let self_initiated_resolved = self.storage.latest_label(&self_initiated_candidate);
        if self.storage.is_present(&self_initiated_resolved) {
            return Some(self_initiated_resolved);
        }

        let opponent_initiated_resolved = self.storage.latest_label(&opponent_initiated_candidate);
        if self.storage.is_present(&opponent_initiated_resolved) {
            return Some(opponent_initiated_resolved);
        }

        None
    }

    /// Called when both reference halves are assigned. Tries both the
    /// self-initiated and opponent-initiated forms of the matching
    /// incomplete label; whichever is still present under its incomplete
    /// label in storage gets relabeled to the complete form. A no-op if
    /// neither is found: either an orphan complete reference naming no
    /// dialogue we know of, or one already relabeled by an earlier call (in
    /// which case it's no longer present under the incomplete label).
    fn complete_dialogue_reference(&mut self, message: &ProtocolMessage) {
        let opponent = message.sender().cloned().unwrap_or_else(|| Address::new(""));
        let complete_reference = message.dialogue_reference().clone();

        for starter_addr in [self.self_address.clone(), opponent.clone()] {
            let complete_label =
                DialogueLabel::new(complete_reference.clone(), opponent.clone(), starter_addr);
            let incomplete_label = complete_label.incomplete_version();

            if self.storage.is_present(&incomplete_label) {
                match self.storage.relabel(&incomplete_label, complete_label.clone()) {
                    Ok(()) => {
                        self.storage.set_incomplete(incomplete_label, complete_label);
                        return;
                    }
                    Err(err) => {
                        log::warn!(
                            "dialogues: failed to complete handshake for {}: {}",
                            incomplete_label,
                            err
                        );
                    }
                }
            }
        }
    }

    fn create_self_initiated(
        &mut self,
        counterparty: Address,
        reference: DialogueReference,
        first_message: &ProtocolMessage,
    ) -> Result<DialogueLabel, DialogueError> {
        if reference.is_complete() {
            return Err(DialogueError::PreassignedResponder);
        }
        let label = DialogueLabel::new(reference, counterparty.clone(), self.self_address.clone());
        let role = (self.role_from_first_message)(first_message, &counterparty);
        let dialogue = Dialogue::new(label.clone(), self.self_address.clone(), role, Arc::clone(&self.rules));
        self.storage.add(dialogue)?;
        Ok(label)
    }

    /// Creates a dialogue for a message the opponent started. The engine is
    /// the responder here, so it is the one that owes the missing reference
    /// half: it synthesizes `local_responder_ref` immediately and relabels
    /// the dialogue to the complete form right away, under which it is
    /// returned and stored. Its own replies then carry the complete
    /// reference from their first message onward — it is the opponent who
    /// still needs to see that reference come back before *their* side of
    /// the handshake completes. The incomplete label stays recorded in
    /// `incomplete_to_complete` only so a stray message still carrying the
    /// original incomplete reference can still be matched.
    fn create_opponent_initiated(
        &mut self,
        counterparty: Address,
        reference: DialogueReference,
        first_message: &ProtocolMessage,
    ) -> Result<DialogueLabel, DialogueError> {
        if reference.is_complete() {
            return Err(DialogueError::PreassignedResponder);
        }
        let incomplete_label = DialogueLabel::new(reference, counterparty.clone(), counterparty.clone());
        let role = (self.role_from_first_message)(first_message, &counterparty);
        let dialogue = Dialogue::new(
            incomplete_label.clone(),
            self.self_address.clone(),
            role,
            Arc::clone(&self.rules),
        );
        self.storage.add(dialogue)?;

        let local_responder_ref = generate_nonce();
        let complete_reference =
            DialogueReference::new(incomplete_label.reference.starter_ref.clone(), local_responder_ref);
        let complete_label = DialogueLabel::new(complete_reference, counterparty.clone(), counterparty);

        self.storage.relabel(&incomplete_label, complete_label.clone())?;
        self.storage.set_incomplete(incomplete_label, complete_label.clone());

        Ok(complete_label)
    }
}
