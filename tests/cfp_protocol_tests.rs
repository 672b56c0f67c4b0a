//! End-to-end exercise of a small CFP-like protocol (`cfp` / `propose` /
//! `accept` / `decline` / `end`) run through two independent [`Dialogues`]
//! coordinators — one per side of the conversation — passing messages to
//! each other directly, the way a transport layer would relay them.

use std::collections::BTreeMap;

use dialogos::{
    Address, DialogueError, Dialogues, EngineConfig, MessageId, Performative, ProtocolMessageBuilder,
    Role, Rules, RulesBuilder, Target,
};

fn cfp_rules() -> Rules {
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

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

fn engine(self_address: &str) -> Dialogues {
    init_logging();
    Dialogues::new(
        Address::from(self_address),
        Box::new(|_msg, _opponent| Role::Role1),
        EngineConfig::default(),
        cfp_rules(),
    )
}

#[test]
fn two_sided_conversation_reaches_terminal_on_both_sides() {
    let mut alice = engine("alice");
    let mut bob = engine("bob");

    let cfp = alice
        .create(Address::from("bob"), Performative::new("cfp"), BTreeMap::new())
        .unwrap();
    let bob_label = bob.update(cfp).unwrap().expect("bob accepts the opener");

    let propose = bob
        .reply(&bob_label, Performative::new("propose"), None, BTreeMap::new())
        .unwrap();
    let alice_label = alice
        .update(propose)
        .unwrap()
        .expect("alice's handshake completes on bob's first reply");
    assert!(alice_label.is_complete());

    let accept = alice
        .reply(&alice_label, Performative::new("accept"), None, BTreeMap::new())
        .unwrap();
    bob.update(accept).unwrap();

    let end = bob
        .reply(&bob_label, Performative::new("end"), None, BTreeMap::new())
        .unwrap();
    alice.update(end).unwrap();

    assert!(alice.storage().terminal_labels().contains(&alice_label));
    assert!(bob.storage().terminal_labels().contains(&bob_label));

    // Both sides recorded the same four-message transcript, just with
    // outgoing/incoming swapped.
    let alice_dialogue = alice.get(&alice_label).unwrap();
    let bob_dialogue = bob.get(&bob_label).unwrap();
    assert_eq!(alice_dialogue.outgoing().len(), 2);
    assert_eq!(alice_dialogue.incoming().len(), 2);
    assert_eq!(bob_dialogue.outgoing().len(), 2);
    assert_eq!(bob_dialogue.incoming().len(), 2);
}

#[test]
fn decline_path_closes_the_dialogue_after_two_messages() {
    let mut alice = engine("alice");
    let mut bob = engine("bob");

    let cfp = alice
        .create(Address::from("bob"), Performative::new("cfp"), BTreeMap::new())
        .unwrap();
    let bob_label = bob.update(cfp).unwrap().unwrap();

    let decline = bob
        .reply(&bob_label, Performative::new("decline"), None, BTreeMap::new())
        .unwrap();
    let alice_label = alice.update(decline).unwrap().unwrap();

    assert!(alice.storage().terminal_labels().contains(&alice_label));
    let err = alice
        .reply(&alice_label, Performative::new("accept"), None, BTreeMap::new())
        .unwrap_err();
    assert_eq!(err, DialogueError::ClosedDialogue);
}

#[test]
fn reply_to_an_earlier_message_than_the_latest_is_rejected_by_rules() {
    // `accept` only validly replies to `propose`, not to `cfp` itself, so
    // targeting the opener directly (even though it's a real stored
    // message) is rejected on performative grounds rather than target
    // range.
    let mut alice = engine("alice");
    let mut bob = engine("bob");

    let cfp = alice
        .create(Address::from("bob"), Performative::new("cfp"), BTreeMap::new())
        .unwrap();
    let bob_label = bob.update(cfp).unwrap().unwrap();

    let propose = bob
        .reply(&bob_label, Performative::new("propose"), None, BTreeMap::new())
        .unwrap();
    let alice_label = alice.update(propose).unwrap().unwrap();

    let err = alice
        .reply(
            &alice_label,
            Performative::new("accept"),
            Some(MessageId::new(1)),
            BTreeMap::new(),
        )
        .unwrap_err();
    assert!(matches!(err, DialogueError::InvalidPerformative(_)));
}

#[test]
fn negative_target_beyond_latest_incoming_is_rejected() {
    let mut alice = engine("alice");
    let mut bob = engine("bob");

    let cfp = alice
        .create(Address::from("bob"), Performative::new("cfp"), BTreeMap::new())
        .unwrap();
    let bob_label = bob.update(cfp).unwrap().unwrap();

    let bad_propose = ProtocolMessageBuilder::new()
        .sender(Address::from("bob"))
        .to(Address::from("alice"))
        .dialogue_reference(bob_label.reference.clone())
        .message_id(MessageId::new(-1))
        .target(Target::new(-9))
        .performative(Performative::new("propose"))
        .build()
        .unwrap();

    let err = alice.update(bad_propose).unwrap_err();
    assert!(matches!(err, DialogueError::InvalidTarget(_)));
}

#[test]
fn opponent_initiated_dialogue_assigns_a_local_responder_reference() {
    let mut alice = engine("alice");
    let mut bob = engine("bob");

    let cfp = bob
        .create(Address::from("alice"), Performative::new("cfp"), BTreeMap::new())
        .unwrap();
    let alice_label = alice
        .update(cfp)
        .unwrap()
        .expect("alice is the responder, so her label is complete as soon as she creates it");
    assert!(alice_label.is_complete());

    let propose = alice
        .reply(&alice_label, Performative::new("propose"), None, BTreeMap::new())
        .unwrap();
    let bob_label = bob
        .update(propose)
        .unwrap()
        .expect("bob's own handshake completes once alice's reply carries the full reference");
    assert!(bob_label.is_complete());
}
