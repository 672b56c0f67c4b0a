//! Error kinds returned by the dialogue engine.
//!
//! Every fallible operation in this crate returns `Result<T, DialogueError>`
//! rather than a boxed trait object: the set of failure modes is closed and
//! callers are expected to match on it (e.g. to decide whether a rejected
//! message should be retried or silently dropped).

use std::fmt;

/// A failure returned by one of the dialogue engine's validating operations.
///
/// # Examples
///
/// ```
/// use dialogos::DialogueError;
///
/// let err = DialogueError::NoSuchTarget(dialogos::MessageId::new(7));
/// assert_eq!(err.to_string(), "no message with id 7 in this dialogue");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueError {
    /// A one-shot field (`sender` or `to`) was set a second time.
    AlreadySet(&'static str),
    /// The message's derived label matches neither the dialogue's label nor
    /// its incomplete version.
    NotBelonging,
    /// `dialogue_reference.starter_ref` did not match the dialogue's label.
    InvalidStarterRef,
    /// The message id did not match the expected next id for its direction.
    InvalidMessageId {
        /// The id the dialogue expected next.
        expected: crate::dialogos::identifiers::MessageId,
        /// The id actually carried by the message.
        got: crate::dialogos::identifiers::MessageId,
    },
    /// The target failed one of the basic-validation checks (wrong value for
    /// a first message, out-of-range magnitude, or a performative that is not
    /// a valid reply to the targeted message).
    InvalidTarget(String),
    /// The performative is not valid in this position (not an initial
    /// performative for an empty dialogue, or not in the target's reply set).
    InvalidPerformative(String),
    /// `reply` was given a target id with no corresponding stored message.
    NoSuchTarget(crate::dialogos::identifiers::MessageId),
    /// `reply` was given both a target id and a target message whose ids
    /// disagree.
    Inconsistent,
    /// `reply` was invoked on a dialogue with no messages yet.
    EmptyDialogue,
    /// `update` was invoked on a dialogue that already reached a terminal
    /// performative.
    ClosedDialogue,
    /// `update_label` was invoked with both the current and incoming
    /// `responder_ref` unassigned.
    CannotRelabel,
    /// `create_self_initiated`/`create_opponent_initiated` was called with a
    /// reference that is already complete.
    PreassignedResponder,
    /// Attempted to create a dialogue whose label is already present in
    /// storage.
    DuplicateLabel(String),
}

impl fmt::Display for DialogueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogueError::AlreadySet(field) => write!(f, "field '{}' is already set", field),
            DialogueError::NotBelonging => {
                write!(f, "message does not belong to this dialogue")
            }
            DialogueError::InvalidStarterRef => write!(f, "starter reference does not match"),
            DialogueError::InvalidMessageId { expected, got } => write!(
                f,
                "invalid message id: expected {}, got {}",
                expected.value(),
                got.value()
            ),
            DialogueError::InvalidTarget(msg) => write!(f, "invalid target: {}", msg),
            DialogueError::InvalidPerformative(msg) => write!(f, "invalid performative: {}", msg),
            DialogueError::NoSuchTarget(id) => {
                write!(f, "no message with id {} in this dialogue", id.value())
            }
            DialogueError::Inconsistent => {
                write!(f, "target id and target message disagree")
            }
            DialogueError::EmptyDialogue => write!(f, "dialogue has no messages yet"),
            DialogueError::ClosedDialogue => write!(f, "dialogue is in a terminal state"),
            DialogueError::CannotRelabel => {
                write!(f, "cannot relabel: both responder references are unassigned")
            }
            DialogueError::PreassignedResponder => {
                write!(f, "reference is already complete")
            }
            DialogueError::DuplicateLabel(label) => {
                write!(f, "a dialogue with label {} already exists", label)
            }
        }
    }
}

impl std::error::Error for DialogueError {}
