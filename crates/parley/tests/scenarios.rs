//! End-to-end scenarios: several chat cores on one in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use parley::delivery::{topic_for, MemoryNetwork};
use parley::store::MessageStore;
use parley::{ChatConfig, ChatCore, ChatError, ConversationKind, PublishOutcome};
use parley_core::{Message, MessageDraft};
use parley_crypto::codec;
use parley_testkit::fixtures::{default_key, fast_retry, identity, sealed_text, ChatNetwork};

const QUIET: Duration = Duration::from_millis(50);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually(mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    anyhow::bail!("condition not reached in time")
}

#[tokio::test]
async fn direct_ids_agree_across_independent_instances() -> anyhow::Result<()> {
    // Separate buses: nothing is exchanged, both sides compute the id alone.
    let alice = ChatNetwork::new().peer(1).await?;
    let bob = ChatNetwork::new().peer(2).await?;

    let on_alice = alice.direct_with(&bob).await?;
    let on_bob = bob.direct_with(&alice).await?;

    assert_eq!(on_alice.id, on_bob.id);
    assert_eq!(on_alice.kind, ConversationKind::Direct);
    assert_eq!(on_alice.participants, on_bob.participants);
    Ok(())
}

#[tokio::test]
async fn direct_chat_both_ways() -> anyhow::Result<()> {
    init_tracing();
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut alice_inbox = alice.inbox(&conversation.id).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let sent = alice.chat.send_message(&conversation.id, "hi bob").await?;
    assert!(sent.delivery.is_delivered());

    let received = bob_inbox.next().await?;
    assert_eq!(received.id(), &sent.message_id);
    assert_eq!(received.sender(), &alice.id);
    assert_eq!(received.content(), "hi bob");
    // Alice's own handler ran for the local copy.
    assert_eq!(alice_inbox.next().await?.id(), &sent.message_id);

    bob.chat.send_message(&conversation.id, "hi alice").await?;
    assert_eq!(alice_inbox.next().await?.content(), "hi alice");

    assert_eq!(
        alice.visible_contents(&conversation.id).await?,
        vec!["hi bob", "hi alice"]
    );
    assert_eq!(
        bob.visible_contents(&conversation.id).await?,
        vec!["hi bob", "hi alice"]
    );
    Ok(())
}

#[tokio::test]
async fn group_fan_out() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let peers = network.peers(3).await?;
    let (alice, bob, carol) = (&peers[0], &peers[1], &peers[2]);

    let group = alice
        .chat
        .create_conversation(
            [bob.id.clone(), carol.id.clone()],
            ConversationKind::Group,
            Some("team".into()),
        )
        .await?;
    assert!(group.id.is_group());

    for peer in [bob, carol] {
        let joined = peer
            .chat
            .join_group(group.id.clone(), group.participants.clone(), None)
            .await?;
        assert_eq!(joined.participants, group.participants);
    }
    let mut bob_inbox = bob.inbox(&group.id).await?;
    let mut carol_inbox = carol.inbox(&group.id).await?;

    alice.chat.send_message(&group.id, "standup in 5").await?;

    assert_eq!(bob_inbox.next().await?.content(), "standup in 5");
    assert_eq!(carol_inbox.next().await?.content(), "standup in 5");
    // Exactly one delivery each.
    bob_inbox.expect_quiet(QUIET).await?;
    carol_inbox.expect_quiet(QUIET).await?;

    carol.chat.send_message(&group.id, "on my way").await?;
    assert_eq!(bob_inbox.next().await?.content(), "on my way");
    assert_eq!(
        bob.visible_contents(&group.id).await?,
        vec!["standup in 5", "on my way"]
    );
    Ok(())
}

#[tokio::test]
async fn late_joiner_replays_group_history() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let dave = network.peer(4).await?;

    let group = alice
        .chat
        .create_conversation([dave.id.clone()], ConversationKind::Group, None)
        .await?;
    alice.chat.send_message(&group.id, "before you joined").await?;

    dave.chat.join_group(group.id.clone(), [], None).await?;

    assert_eq!(
        dave.visible_contents(&group.id).await?,
        vec!["before you joined"]
    );
    Ok(())
}

#[tokio::test]
async fn history_less_bus_serves_local_state() -> anyhow::Result<()> {
    let network = ChatNetwork::without_history();
    let alice = network.peer(1).await?;
    let dave = network.peer(4).await?;

    let group = alice
        .chat
        .create_conversation([dave.id.clone()], ConversationKind::Group, None)
        .await?;
    alice.chat.send_message(&group.id, "before you joined").await?;

    dave.chat.join_group(group.id.clone(), [], None).await?;
    assert!(dave.chat.fetch_history(&group.id).await?.is_empty());

    // Live traffic still flows.
    let mut dave_inbox = dave.inbox(&group.id).await?;
    alice.chat.send_message(&group.id, "welcome").await?;
    assert_eq!(dave_inbox.next().await?.content(), "welcome");
    assert_eq!(dave.visible_contents(&group.id).await?, vec!["welcome"]);
    Ok(())
}

#[tokio::test]
async fn replay_can_be_left_to_the_caller() -> anyhow::Result<()> {
    let network = ChatNetwork::new().with_config(ChatConfig {
        retry: fast_retry(),
        replay_on_subscribe: false,
        ..ChatConfig::default()
    });
    let alice = network.peer(1).await?;
    let dave = network.peer(4).await?;

    let group = alice
        .chat
        .create_conversation([dave.id.clone()], ConversationKind::Group, None)
        .await?;
    alice.chat.send_message(&group.id, "before you joined").await?;

    dave.chat.join_group(group.id.clone(), [], None).await?;
    assert!(dave.visible_contents(&group.id).await?.is_empty());

    let fetched = dave.chat.fetch_history(&group.id).await?;
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].content(), "before you joined");
    Ok(())
}

#[tokio::test]
async fn stalled_history_does_not_block_joining() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let dave = network.peer(4).await?;

    let group = alice
        .chat
        .create_conversation([dave.id.clone()], ConversationKind::Group, None)
        .await?;
    alice.chat.send_message(&group.id, "before you joined").await?;

    network.bus.hang_history(true);
    let joining = dave.chat.join_group(group.id.clone(), [], None);
    tokio::time::timeout(Duration::from_secs(2), joining).await??;
    assert!(dave.visible_contents(&group.id).await?.is_empty());

    network.bus.hang_history(false);
    assert_eq!(dave.chat.fetch_history(&group.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn revoke_propagates_to_receivers() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let keep = alice.chat.send_message(&conversation.id, "keep me").await?;
    let oops = alice.chat.send_message(&conversation.id, "oops").await?;
    bob_inbox.next_n(2).await?;

    let revoked = alice
        .chat
        .revoke_message(&conversation.id, &oops.message_id)
        .await?;
    assert!(revoked.delivery.is_delivered());

    let tombstone = bob_inbox.next().await?;
    assert!(tombstone.is_tombstone());
    assert_eq!(tombstone.tombstone_for(), Some(&oops.message_id));

    for peer in [&alice, &bob] {
        let visible = peer.chat.visible_messages(&conversation.id).await?;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id(), &keep.message_id);
        assert!(visible.iter().all(|m| !m.is_tombstone()));
    }
    // Revoked, not erased.
    assert_eq!(bob.chat.store().count(&conversation.id).await?, 3);
    Ok(())
}

#[tokio::test]
async fn revoking_someone_elses_message_is_refused() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let sent = alice.chat.send_message(&conversation.id, "mine").await?;
    bob_inbox.next().await?;

    let publishes = network.bus.publish_count();
    let err = bob
        .chat
        .revoke_message(&conversation.id, &sent.message_id)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::NotAuthorSender));
    assert_eq!(network.bus.publish_count(), publishes);
    assert_eq!(bob.chat.store().count(&conversation.id).await?, 1);
    assert_eq!(bob.visible_contents(&conversation.id).await?, vec!["mine"]);
    Ok(())
}

#[tokio::test]
async fn forged_tombstone_from_another_sender_hides_nothing() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let sent = alice.chat.send_message(&conversation.id, "still here").await?;
    bob_inbox.next().await?;

    // Mallory knows the id and key but is not the author.
    let mallory = identity(9);
    let key = default_key(&conversation.id);
    let draft = MessageDraft::tombstone(
        conversation.id.clone(),
        mallory.id().clone(),
        sent.message_id.clone(),
        1,
    );
    let forged = codec::seal(draft, &mallory, &key);
    let wire = codec::encode_for_wire(&forged, &key)?;
    network.bus.inject(&topic_for(&conversation.id), wire).await;

    let stored = bob_inbox.next().await?;
    assert_eq!(stored.id(), forged.id());
    assert_eq!(
        bob.visible_contents(&conversation.id).await?,
        vec!["still here"]
    );
    Ok(())
}

#[tokio::test]
async fn redelivery_is_absorbed() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    alice.chat.send_message(&conversation.id, "once").await?;
    bob_inbox.next().await?;

    network.bus.redeliver(&topic_for(&conversation.id)).await;
    network.bus.redeliver(&topic_for(&conversation.id)).await;

    eventually(|| bob.chat.stats().duplicates >= 2).await?;
    bob_inbox.expect_quiet(QUIET).await?;
    assert_eq!(bob.visible_contents(&conversation.id).await?, vec!["once"]);
    Ok(())
}

#[tokio::test]
async fn reconstructed_copy_is_a_duplicate() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    alice.chat.send_message(&conversation.id, "original").await?;
    let original = bob_inbox.next().await?;

    // Same message re-encrypted under a fresh nonce: different bytes, same id.
    let key = default_key(&conversation.id);
    let copy = codec::encode_for_wire(&original, &key)?;
    network.bus.inject(&topic_for(&conversation.id), copy).await;

    eventually(|| bob.chat.stats().duplicates >= 1).await?;
    bob_inbox.expect_quiet(QUIET).await?;
    assert_eq!(bob.chat.store().count(&conversation.id).await?, 1);
    Ok(())
}

#[tokio::test]
async fn local_delete_stays_local() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let sent = alice.chat.send_message(&conversation.id, "ephemeral").await?;
    bob_inbox.next().await?;

    assert!(
        bob.chat
            .delete_message_locally(&conversation.id, &sent.message_id)
            .await?
    );
    assert!(bob.visible_contents(&conversation.id).await?.is_empty());
    assert_eq!(
        alice.visible_contents(&conversation.id).await?,
        vec!["ephemeral"]
    );

    // A redelivered copy does not bring it back.
    network.bus.redeliver(&topic_for(&conversation.id)).await;
    eventually(|| bob.chat.stats().duplicates >= 1).await?;
    bob_inbox.expect_quiet(QUIET).await?;
    assert!(bob.visible_contents(&conversation.id).await?.is_empty());

    // Neither does an explicit history fetch.
    assert!(bob.chat.fetch_history(&conversation.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_a_tombstone_keeps_the_target_hidden() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let secret = alice.chat.send_message(&conversation.id, "secret").await?;
    bob_inbox.next().await?;
    let revoked = alice
        .chat
        .revoke_message(&conversation.id, &secret.message_id)
        .await?;
    bob_inbox.next().await?;

    for peer in [&alice, &bob] {
        assert!(
            !peer
                .chat
                .delete_message_locally(&conversation.id, &revoked.message_id)
                .await?
        );
        assert!(peer.visible_contents(&conversation.id).await?.is_empty());
    }

    // Redelivery of both messages changes nothing.
    network.bus.redeliver(&topic_for(&conversation.id)).await;
    eventually(|| bob.chat.stats().duplicates >= 2).await?;
    assert!(bob.visible_contents(&conversation.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_publish_is_reported_and_kept_locally() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;

    let conversation = alice.direct_with(&bob).await?;
    bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    network.bus.fail_next_publishes(100);
    let sent = alice.chat.send_message(&conversation.id, "lost in transit").await?;

    match &sent.delivery {
        PublishOutcome::Failed { attempts, .. } => assert_eq!(*attempts, fast_retry().max_attempts),
        other => panic!("expected a failed publish, got {:?}", other),
    }
    assert_eq!(
        alice.visible_contents(&conversation.id).await?,
        vec!["lost in transit"]
    );
    bob_inbox.expect_quiet(QUIET).await?;
    Ok(())
}

#[tokio::test]
async fn hung_transport_is_bounded_by_the_deadline() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let group = alice
        .chat
        .create_conversation([], ConversationKind::Group, None)
        .await?;

    network.bus.hang_publishes(true);
    let sent = tokio::time::timeout(
        Duration::from_secs(5),
        alice.chat.send_message(&group.id, "into the void"),
    )
    .await??;

    assert!(!sent.delivery.is_delivered());
    assert_eq!(
        alice.visible_contents(&group.id).await?,
        vec!["into the void"]
    );
    Ok(())
}

#[tokio::test]
async fn mismatched_key_material_cannot_read() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;

    let eve_config = ChatConfig {
        key_material: "a different deployment".into(),
        retry: fast_retry(),
        ..ChatConfig::default()
    };
    let eve = ChatCore::in_memory(Arc::new(network.bus.create_transport()), eve_config);
    let eve_id = eve.init(Some(identity(5))).await?.id().clone();

    let conversation = alice
        .chat
        .create_conversation([eve_id], ConversationKind::Direct, None)
        .await?;
    let on_eve = eve
        .create_conversation([alice.id.clone()], ConversationKind::Direct, None)
        .await?;
    assert_eq!(on_eve.id, conversation.id);

    alice.chat.send_message(&conversation.id, "secret").await?;

    eventually(|| eve.stats().dropped_unattributed >= 1).await?;
    assert!(eve.visible_messages(&conversation.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn garbage_payloads_are_dropped() -> anyhow::Result<()> {
    let network = ChatNetwork::new();
    let alice = network.peer(1).await?;
    let bob = network.peer(2).await?;
    let conversation = bob.direct_with(&alice).await?;
    let mut bob_inbox = bob.inbox(&conversation.id).await?;

    let topic = topic_for(&conversation.id);
    network.bus.inject(&topic, b"not a message".to_vec().into()).await;

    // Sealed for a conversation bob is not in.
    let stranger = identity(7);
    let elsewhere = parley::ConversationId::new("elsewhere");
    let (_, wire) = sealed_text(&stranger, &elsewhere, &default_key(&elsewhere), "psst", 1)?;
    network.bus.inject(&topic, wire.into()).await;

    eventually(|| bob.chat.stats().dropped_unattributed >= 2).await?;
    bob_inbox.expect_quiet(QUIET).await?;
    Ok(())
}

#[tokio::test]
async fn sqlite_core_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("alice.db");
    let bus = MemoryNetwork::new();
    let config = ChatConfig {
        retry: fast_retry(),
        ..ChatConfig::default()
    };
    let bob = identity(2);

    let (first_id, conversation_id, sent_id) = {
        let chat = ChatCore::open(&path, Arc::new(bus.create_transport()), config.clone())?;
        let me = chat.init(None).await?;
        let conversation = chat
            .create_conversation([bob.id().clone()], ConversationKind::Direct, None)
            .await?;
        let sent = chat.send_message(&conversation.id, "persisted").await?;
        chat.close().await;
        (me.id().clone(), conversation.id, sent.message_id)
    };

    let chat = ChatCore::open(&path, Arc::new(bus.create_transport()), config)?;
    let me = chat.init(None).await?;
    assert_eq!(me.id(), &first_id);

    let conversation = chat
        .create_conversation([bob.id().clone()], ConversationKind::Direct, None)
        .await?;
    assert_eq!(conversation.id, conversation_id);

    let visible: Vec<Message> = chat.visible_messages(&conversation.id).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id(), &sent_id);
    assert_eq!(visible[0].content(), "persisted");

    // Replay on reopen saw our own publish again and dropped it.
    assert_eq!(chat.stats().duplicates, 1);
    Ok(())
}
