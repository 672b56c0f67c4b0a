//! [`Storage`]: the multi-index container that owns every live [`Dialogue`]
//! and manages the terminal-state lifecycle.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::dialogos::config::EngineConfig;
use crate::dialogos::dialogue::Dialogue;
use crate::dialogos::error::DialogueError;
use crate::dialogos::identifiers::{Address, DialogueLabel};

/// Owns every [`Dialogue`] for one [`Dialogues`](crate::dialogos::coordinator::Dialogues)
/// instance, indexed by label and by opponent, and tracks which labels have
/// reached a terminal state.
///
/// `Dialogue` cannot itself own a back-reference into `Storage` without
/// forming an ownership cycle, so `add` registers a terminal
/// callback that only flips a shared flag; [`Storage::settle`] — called by
/// the coordinator immediately after every `update`/`reply` — reads that
/// flag and performs the actual eviction or retention.
pub struct Storage {
    config: EngineConfig,
    by_label: BTreeMap<DialogueLabel, Dialogue>,
    by_opponent: BTreeMap<Address, Vec<DialogueLabel>>,
    incomplete_to_complete: BTreeMap<DialogueLabel, DialogueLabel>,
    terminal_labels: BTreeSet<DialogueLabel>,
    terminal_flags: BTreeMap<DialogueLabel, Rc<Cell<bool>>>,
}

impl Storage {
    /// Creates empty storage governed by `config`.
    pub fn new(config: EngineConfig) -> Self {
        Storage {
            config,
            by_label: BTreeMap::new(),
            by_opponent: BTreeMap::new(),
            incomplete_to_complete: BTreeMap::new(),
            terminal_labels: BTreeSet::new(),
            terminal_flags: BTreeMap::new(),
        }
    }

    /// Inserts a freshly created dialogue. Fails with
    /// [`DialogueError::DuplicateLabel`] if its label is already present.
    pub fn add(&mut self, mut dialogue: Dialogue) -> Result<(), DialogueError> {
        let label = dialogue.label().clone();
        if self.by_label.contains_key(&label) {
            return Err(DialogueError::DuplicateLabel(label.to_string()));
        }

        let flag = Rc::new(Cell::new(false));
        let flag_for_callback = Rc::clone(&flag);
        dialogue.add_terminal_callback(Box::new(move |_d| flag_for_callback.set(true)));
        self.terminal_flags.insert(label.clone(), flag);

        self.by_opponent
            .entry(label.opponent_addr.clone())
            .or_default()
            .push(label.clone());
        self.by_label.insert(label, dialogue);
        Ok(())
    }

    /// Removes the dialogue under `label` from every index, including any
    /// `incomplete_to_complete` entry that names it either as key or value.
    pub fn remove(&mut self, label: &DialogueLabel) -> Option<Dialogue> {
        let dialogue = self.by_label.remove(label)?;
        if let Some(labels) = self.by_opponent.get_mut(&dialogue.label().opponent_addr) {
            labels.retain(|l| l != label);
            if labels.is_empty() {
                self.by_opponent.remove(&dialogue.label().opponent_addr);
            }
        }
        self.incomplete_to_complete.remove(label);
        self.incomplete_to_complete.retain(|_, complete| complete != label);
        self.terminal_labels.remove(label);
        self.terminal_flags.remove(label);
        log::debug!("storage[{}]: removed dialogue {}", self.config.dialogue_name, label);
        Some(dialogue)
    }

    /// Looks up a dialogue by its current label.
    pub fn get(&self, label: &DialogueLabel) -> Option<&Dialogue> {
        self.by_label.get(label)
    }

    /// Looks up a dialogue by its current label, mutably.
    pub fn get_mut(&mut self, label: &DialogueLabel) -> Option<&mut Dialogue> {
        self.by_label.get_mut(label)
    }

    /// Every dialogue currently stored against `addr`, in insertion order.
    pub fn dialogues_by_opponent(&self, addr: &Address) -> Vec<&Dialogue> {
        self.by_opponent
            .get(addr)
            .map(|labels| labels.iter().filter_map(|l| self.by_label.get(l)).collect())
            .unwrap_or_default()
    }

    /// Records that `incomplete_label` has been completed by `complete_label`.
    pub fn set_incomplete(&mut self, incomplete_label: DialogueLabel, complete_label: DialogueLabel) {
        self.incomplete_to_complete.insert(incomplete_label, complete_label);
    }

    /// Resolves `label` through the incomplete→complete map, returning
    /// `label` itself if no mapping is recorded. Idempotent: applying it
    /// twice is the same as applying it once, since entries map to complete
    /// labels that are never themselves keys.
    pub fn latest_label(&self, label: &DialogueLabel) -> DialogueLabel {
        self.incomplete_to_complete
            .get(label)
            .cloned()
            .unwrap_or_else(|| label.clone())
    }

    /// True iff `label` has a recorded incomplete→complete mapping.
    pub fn is_in_incomplete(&self, label: &DialogueLabel) -> bool {
        self.incomplete_to_complete.contains_key(label)
    }

    /// True iff a dialogue is currently stored under `label`.
    pub fn is_present(&self, label: &DialogueLabel) -> bool {
        self.by_label.contains_key(label)
    }

    /// Labels retained in the terminal index (only populated when
    /// `config.keep_terminal` is true).
    pub fn terminal_labels(&self) -> &BTreeSet<DialogueLabel> {
        &self.terminal_labels
    }

    /// Moves the dialogue stored under `old_label` to `new_label`,
    /// rewriting its own label in the process. Used when the responder's
    /// first reply completes a dialogue reference during handshake.
    pub fn relabel(&mut self, old_label: &DialogueLabel, new_label: DialogueLabel) -> Result<(), DialogueError> {
        let mut dialogue = self
            .by_label
            .remove(old_label)
            .ok_or(DialogueError::NotBelonging)?;
        dialogue.update_label(new_label.clone())?;

        if let Some(labels) = self.by_opponent.get_mut(&new_label.opponent_addr) {
            labels.retain(|l| l != old_label);
        }
        if let Some(flag) = self.terminal_flags.remove(old_label) {
            self.terminal_flags.insert(new_label.clone(), flag);
        }
        self.by_opponent
            .entry(new_label.opponent_addr.clone())
            .or_default()
            .push(new_label.clone());
        self.by_label.insert(new_label, dialogue);
        Ok(())
    }

    /// Applies the terminal-state lifecycle for `label`: a no-op unless the
    /// dialogue's terminal callback fired since the last call, in which case
    /// the dialogue is either moved into [`Storage::terminal_labels`] or
    /// evicted entirely, per `config.keep_terminal`. Called by the
    /// coordinator immediately after every `update`/`reply`.
    pub fn settle(&mut self, label: &DialogueLabel) {
        let became_terminal = self
            .terminal_flags
            .get(label)
            .map(|flag| flag.get())
            .unwrap_or(false);
        if !became_terminal {
            return;
        }
        if self.config.keep_terminal {
            log::debug!(
                "storage[{}]: retaining terminal dialogue {}",
                self.config.dialogue_name,
                label
            );
            self.terminal_labels.insert(label.clone());
        } else {
            log::debug!(
                "storage[{}]: evicting terminal dialogue {}",
                self.config.dialogue_name,
                label
            );
            self.remove(label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogos::dialogue::Role;
    use crate::dialogos::identifiers::DialogueReference;
    use crate::dialogos::message::ProtocolMessageBuilder;
    use crate::dialogos::identifiers::{MessageId, Performative, Target};
    use crate::dialogos::rules::RulesBuilder;
    use std::sync::Arc;

    fn rules() -> Arc<crate::dialogos::rules::Rules> {
        Arc::new(
            RulesBuilder::new()
                .with_initial([Performative::new("cfp")])
                .with_terminal([Performative::new("end")])
                .with_reply(Performative::new("cfp"), [Performative::new("end")])
                .build()
                .unwrap(),
        )
    }

    fn label(starter_ref: &str, responder_ref: &str) -> DialogueLabel {
        DialogueLabel::new(
            DialogueReference::new(starter_ref, responder_ref),
            Address::from("B"),
            Address::from("A"),
        )
    }

    #[test]
    fn add_indexes_by_label_and_opponent() {
        let mut storage = Storage::new(EngineConfig::default());
        let dialogue = Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules());
        storage.add(dialogue).unwrap();

        assert!(storage.is_present(&label("n1", "")));
        assert_eq!(storage.dialogues_by_opponent(&Address::from("B")).len(), 1);
    }

    #[test]
    fn add_rejects_duplicate_label() {
        let mut storage = Storage::new(EngineConfig::default());
        storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap();
        let err = storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap_err();
        assert!(matches!(err, DialogueError::DuplicateLabel(_)));
    }

    #[test]
    fn remove_clears_every_index() {
        let mut storage = Storage::new(EngineConfig::default());
        storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap();
        storage.set_incomplete(label("n1", ""), label("n1", "n2"));

        storage.remove(&label("n1", "")).unwrap();

        assert!(!storage.is_present(&label("n1", "")));
        assert!(storage.dialogues_by_opponent(&Address::from("B")).is_empty());
        assert!(!storage.is_in_incomplete(&label("n1", "")));
    }

    #[test]
    fn latest_label_is_identity_without_mapping() {
        let storage = Storage::new(EngineConfig::default());
        assert_eq!(storage.latest_label(&label("n1", "")), label("n1", ""));
    }

    #[test]
    fn latest_label_follows_mapping() {
        let mut storage = Storage::new(EngineConfig::default());
        storage.set_incomplete(label("n1", ""), label("n1", "n2"));
        assert_eq!(storage.latest_label(&label("n1", "")), label("n1", "n2"));
    }

    #[test]
    fn settle_evicts_when_keep_terminal_is_false() {
        let config = EngineConfig {
            keep_terminal: false,
            ..EngineConfig::default()
        };
        let mut storage = Storage::new(config);
        storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap();

        let msg = ProtocolMessageBuilder::new()
            .sender(Address::from("A"))
            .to(Address::from("B"))
            .dialogue_reference(DialogueReference::new("n1", ""))
            .message_id(MessageId::new(1))
            .target(Target::STARTING_TARGET)
            .performative(Performative::new("cfp"))
            .build()
            .unwrap();
        // Simulate the coordinator: mutate the stored dialogue, then settle.
        storage.get_mut(&label("n1", "")).unwrap().update(msg).unwrap();
        storage.settle(&label("n1", ""));
        assert!(storage.is_present(&label("n1", "")));

        let reply = ProtocolMessageBuilder::new()
            .sender(Address::from("B"))
            .to(Address::from("A"))
            .dialogue_reference(DialogueReference::new("n1", ""))
            .message_id(MessageId::new(-1))
            .target(Target::new(1))
            .performative(Performative::new("end"))
            .build()
            .unwrap();
        storage.get_mut(&label("n1", "")).unwrap().update(reply).unwrap();
        storage.settle(&label("n1", ""));
        assert!(!storage.is_present(&label("n1", "")));
    }

    #[test]
    fn settle_retains_when_keep_terminal_is_true() {
        let mut storage = Storage::new(EngineConfig::default());
        storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap();

        let open = ProtocolMessageBuilder::new()
            .sender(Address::from("A"))
            .to(Address::from("B"))
            .dialogue_reference(DialogueReference::new("n1", ""))
            .message_id(MessageId::new(1))
            .target(Target::STARTING_TARGET)
            .performative(Performative::new("cfp"))
            .build()
            .unwrap();
        storage.get_mut(&label("n1", "")).unwrap().update(open).unwrap();
        storage.settle(&label("n1", ""));

        let close = ProtocolMessageBuilder::new()
            .sender(Address::from("B"))
            .to(Address::from("A"))
            .dialogue_reference(DialogueReference::new("n1", ""))
            .message_id(MessageId::new(-1))
            .target(Target::new(1))
            .performative(Performative::new("end"))
            .build()
            .unwrap();
        storage.get_mut(&label("n1", "")).unwrap().update(close).unwrap();
        storage.settle(&label("n1", ""));

        assert!(storage.is_present(&label("n1", "")));
        assert!(storage.terminal_labels().contains(&label("n1", "")));
    }

    #[test]
    fn relabel_reindexes_under_new_label() {
        let mut storage = Storage::new(EngineConfig::default());
        storage
            .add(Dialogue::new(label("n1", ""), Address::from("A"), Role::Role1, rules()))
            .unwrap();

        storage.relabel(&label("n1", ""), label("n1", "n2")).unwrap();

        assert!(!storage.is_present(&label("n1", "")));
        assert!(storage.is_present(&label("n1", "n2")));
        assert_eq!(storage.dialogues_by_opponent(&Address::from("B")).len(), 1);
    }
}
