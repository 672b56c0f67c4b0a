//! [`Rules`]: the per-protocol reply graph — initial performatives, terminal
//! performatives, and the valid-reply relation between them.

use std::collections::{BTreeMap, BTreeSet};

use crate::dialogos::error::DialogueError;
use crate::dialogos::identifiers::Performative;

/// A protocol's rule set: which performatives may open a dialogue, which
/// close it, and which performatives are valid replies to which.
#[derive(Debug, Clone)]
pub struct Rules {
    initial_performatives: BTreeSet<Performative>,
    terminal_performatives: BTreeSet<Performative>,
    valid_replies: BTreeMap<Performative, BTreeSet<Performative>>,
}

impl Rules {
    /// True iff `p` may open a dialogue.
    pub fn is_initial(&self, p: &Performative) -> bool {
        self.initial_performatives.contains(p)
    }

    /// True iff `p` closes a dialogue.
    pub fn is_terminal(&self, p: &Performative) -> bool {
        self.terminal_performatives.contains(p)
    }

    /// The set of performatives that are valid replies to `p`. Empty if `p`
    /// is unknown or terminal.
    pub fn valid_replies(&self, p: &Performative) -> BTreeSet<Performative> {
        self.valid_replies.get(p).cloned().unwrap_or_default()
    }

    /// Every performative named anywhere in this rule set: the union of the
    /// initial set, the terminal set, and every key/value in the reply map.
    pub fn performatives(&self) -> impl Iterator<Item = &Performative> {
        self.initial_performatives
            .iter()
            .chain(self.terminal_performatives.iter())
            .chain(self.valid_replies.keys())
            .chain(self.valid_replies.values().flatten())
    }
}

/// Builder enforcing the construction-time invariants: the initial set must
/// be non-empty, every key in the reply map must be a known performative,
/// and terminal performatives must have an empty reply set.
#[derive(Debug, Clone, Default)]
pub struct RulesBuilder {
    initial_performatives: BTreeSet<Performative>,
    terminal_performatives: BTreeSet<Performative>,
    valid_replies: BTreeMap<Performative, BTreeSet<Performative>>,
}

impl RulesBuilder {
    /// Starts a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the initial performatives (performatives that may open a
    /// dialogue).
    pub fn with_initial(mut self, performatives: impl IntoIterator<Item = Performative>) -> Self {
        self.initial_performatives.extend(performatives);
        self
    }

    /// Registers the terminal performatives (performatives that close a
    /// dialogue).
    pub fn with_terminal(mut self, performatives: impl IntoIterator<Item = Performative>) -> Self {
        self.terminal_performatives.extend(performatives);
        self
    }

    /// Registers that `replies` are valid responses to `performative`.
    pub fn with_reply(
        mut self,
        performative: Performative,
        replies: impl IntoIterator<Item = Performative>,
    ) -> Self {
        self.valid_replies
            .entry(performative)
            .or_default()
            .extend(replies);
        self
    }

    /// Validates and builds the [`Rules`].
    pub fn build(self) -> Result<Rules, DialogueError> {
        if self.initial_performatives.is_empty() {
            return Err(DialogueError::InvalidPerformative(
                "initial_performatives must be non-empty".to_string(),
            ));
        }

        let known: BTreeSet<&Performative> = self
            .initial_performatives
            .iter()
            .chain(self.terminal_performatives.iter())
            .chain(self.valid_replies.keys())
            .chain(self.valid_replies.values().flatten())
            .collect();

        for key in self.valid_replies.keys() {
            if !known.contains(key) {
                return Err(DialogueError::InvalidPerformative(format!(
                    "valid_replies key '{}' is not a known performative",
                    key
                )));
            }
        }

        for terminal in &self.terminal_performatives {
            if let Some(replies) = self.valid_replies.get(terminal) {
                if !replies.is_empty() {
                    return Err(DialogueError::InvalidPerformative(format!(
                        "terminal performative '{}' must have an empty reply set",
                        terminal
                    )));
                }
            }
        }

        Ok(Rules {
            initial_performatives: self.initial_performatives,
            terminal_performatives: self.terminal_performatives,
            valid_replies: self.valid_replies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfp_protocol() -> Rules {
        RulesBuilder::new()
            .with_initial([Performative::new("cfp")])
            .with_terminal([Performative::new("end"), Performative::new("decline")])
            .with_reply(
                Performative::new("cfp"),
                [Performative::new("propose"), Performative::new("decline")],
            )
            .with_reply(
                Performative::new("propose"),
                [Performative::new("accept"), Performative::new("decline")],
            )
            .with_reply(Performative::new("accept"), [Performative::new("end")])
            .build()
            .unwrap()
    }

    #[test]
    fn basic_classification() {
        let rules = cfp_protocol();
        assert!(rules.is_initial(&Performative::new("cfp")));
        assert!(!rules.is_initial(&Performative::new("propose")));
        assert!(rules.is_terminal(&Performative::new("end")));
        assert!(rules.is_terminal(&Performative::new("decline")));
        assert!(!rules.is_terminal(&Performative::new("cfp")));
    }

    #[test]
    fn valid_replies_empty_for_unknown_or_terminal() {
        let rules = cfp_protocol();
        assert!(rules.valid_replies(&Performative::new("end")).is_empty());
        assert!(rules
            .valid_replies(&Performative::new("nonexistent"))
            .is_empty());
        assert!(rules
            .valid_replies(&Performative::new("cfp"))
            .contains(&Performative::new("propose")));
    }

    #[test]
    fn rejects_empty_initial_set() {
        let result = RulesBuilder::new()
            .with_terminal([Performative::new("end")])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_reply_key_unknown_to_protocol() {
        let result = RulesBuilder::new()
            .with_initial([Performative::new("cfp")])
            .with_reply(
                Performative::new("unregistered"),
                [Performative::new("cfp")],
            )
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rejects_terminal_performative_with_replies() {
        let result = RulesBuilder::new()
            .with_initial([Performative::new("cfp")])
            .with_terminal([Performative::new("end")])
            .with_reply(Performative::new("end"), [Performative::new("cfp")])
            .build();
        assert!(result.is_err());
    }
}
