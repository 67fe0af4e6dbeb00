//! End-to-end lifecycle scenarios for the channel manager.
//!
//! These walk whole negotiations through the state machine and check
//! the observable outcomes: states, nonces, logs and event order.

use serde_json::{json, Map};

use parley_channel::{ChannelConfig, ChannelError, ChannelManager};
use parley_core::{ChannelFilter, ChannelState, MessageKind};
use parley_store::MemoryStore;
use parley_testkit::TestFixture;

fn manager() -> ChannelManager<MemoryStore> {
    ChannelManager::new(MemoryStore::new(), ChannelConfig::default())
}

fn data(pairs: &[(&str, &str)]) -> Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

#[tokio::test]
async fn happy_path_bilateral_session() {
    let fixture = TestFixture::new();
    let manager = manager();

    // open a 48-hour internship negotiation
    let channel = manager
        .create_channel(fixture.open_request_with(data(&[("job_type", "internship")]), Some(48.0)))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Opening);
    assert_eq!(channel.nonce, 0);

    // counterparty accepts
    let channel = manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Open);

    // candidate applies
    manager
        .add_message(fixture.message(
            &channel.id,
            MessageKind::JobApplication,
            data(&[("position", "dev"), ("resume", "hash://resume")]),
        ))
        .await
        .unwrap();

    // recruiter moves the application forward
    let response = manager
        .update_state(fixture.signed_update(&channel.id, 1, data(&[("status", "under_review")])))
        .await
        .unwrap();
    assert_eq!(response.nonce, 1);
    assert!(response.success);

    // candidate initiates a cooperative close
    let channel = manager
        .close_channel(fixture.close_request(&channel.id, false))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Closing);

    // final channel: nonce 1, one message, merged data
    let info = manager.get_channel_info(&channel.id).await.unwrap();
    assert_eq!(info.channel.nonce, 1);
    assert_eq!(info.messages.len(), 1);
    assert_eq!(info.channel.data["job_type"], json!("internship"));
    assert_eq!(info.channel.data["status"], json!("under_review"));

    // events in per-channel causal order
    let kinds: Vec<String> = manager
        .get_channel_events(&channel.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            "channel_created",
            "channel_accepted",
            "message_added",
            "state_updated",
            "channel_closing",
        ]
    );
}

#[tokio::test]
async fn nonce_replay_is_rejected() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    manager
        .update_state(fixture.signed_update(&channel.id, 1, data(&[("status", "under_review")])))
        .await
        .unwrap();

    // replaying the same nonce must fail and change nothing
    let err = manager
        .update_state(fixture.signed_update(&channel.id, 1, data(&[("status", "hijacked")])))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::Nonce { expected: 2, got: 1 }));

    let channel = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(channel.nonce, 1);
    assert_eq!(channel.data["status"], json!("under_review"));
}

#[tokio::test]
async fn nonce_increments_by_exactly_one() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    for nonce in 1..=3 {
        let before = manager.get_channel(&channel.id).await.unwrap().nonce;
        let response = manager
            .update_state(fixture.signed_update(&channel.id, nonce, Map::new()))
            .await
            .unwrap();
        assert_eq!(response.nonce, before + 1);
    }

    // skipping ahead is also a nonce violation
    let err = manager
        .update_state(fixture.signed_update(&channel.id, 5, Map::new()))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "nonce");
}

#[tokio::test]
async fn tampered_accept_signature_is_rejected() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();

    let mut request = fixture.accept_request(&channel.id);
    request.signature.bytes.0[7] ^= 0x01;

    let err = manager.accept_channel(request).await.unwrap_err();
    assert_eq!(err.tag(), "signature");

    // the channel never left Opening
    let channel = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(channel.state, ChannelState::Opening);
}

#[tokio::test]
async fn expiry_closes_channels_and_freezes_them() {
    let fixture = TestFixture::new();
    let manager = manager();

    // roughly one second of TTL
    let channel = manager
        .create_channel(fixture.open_request(Some(0.0003)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    // an update racing the sweep is already refused
    let err = manager
        .update_state(fixture.signed_update(&channel.id, 1, Map::new()))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "expired");

    assert_eq!(manager.cleanup_expired().await.unwrap(), 1);

    let channel = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(channel.state, ChannelState::Closed);

    let events = manager.get_channel_events(&channel.id).await.unwrap();
    assert!(events.iter().any(|e| e.kind == "channel_expired"));

    // the channel is frozen now
    let err = manager
        .update_state(fixture.signed_update(&channel.id, 1, Map::new()))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");

    // cleanup is idempotent
    assert_eq!(manager.cleanup_expired().await.unwrap(), 0);
    let again = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(again.state, ChannelState::Closed);
}

#[tokio::test]
async fn cooperative_close_needs_a_counter_signature() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    // candidate initiates
    let channel = manager
        .close_channel(fixture.close_request(&channel.id, false))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Closing);

    // the initiator cannot counter-sign their own close
    let err = manager
        .close_channel(fixture.close_request(&channel.id, false))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");

    // the counterparty completes it
    let channel = manager
        .close_channel(fixture.close_request_by(&fixture.recruiter, &channel.id, false))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Closed);

    // a closed channel never reopens
    let err = manager
        .close_channel(fixture.close_request(&channel.id, true))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");
}

#[tokio::test]
async fn force_close_still_requires_a_participant_signature() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    // an outsider cannot force-close
    let outsider = parley_core::Keypair::generate();
    let err = manager
        .close_channel(fixture.close_request_by(&outsider, &channel.id, true))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "signature");
    assert_eq!(
        manager.get_channel(&channel.id).await.unwrap().state,
        ChannelState::Open
    );

    // a participant can
    let channel = manager
        .close_channel(fixture.close_request_by(&fixture.recruiter, &channel.id, true))
        .await
        .unwrap();
    assert_eq!(channel.state, ChannelState::Closed);
}

#[tokio::test]
async fn dispute_message_freezes_the_channel() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    manager
        .add_message(fixture.message(
            &channel.id,
            MessageKind::Dispute,
            data(&[("reason", "offer terms changed after signing")]),
        ))
        .await
        .unwrap();

    let channel = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(channel.state, ChannelState::Disputed);

    // no further messages or updates
    let err = manager
        .add_message(fixture.message(
            &channel.id,
            MessageKind::ResumeRequest,
            data(&[("note", "hello?")]),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");

    let err = manager
        .update_state(fixture.signed_update(&channel.id, 1, Map::new()))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");
}

#[tokio::test]
async fn messages_rejected_while_opening() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();

    let err = manager
        .add_message(fixture.message(
            &channel.id,
            MessageKind::ResumeRequest,
            data(&[("note", "too early")]),
        ))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "state");
}

#[tokio::test]
async fn snapshots_are_isolated_from_the_store() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();

    let mut snapshot = manager.get_channel(&channel.id).await.unwrap();
    snapshot.state = ChannelState::Closed;
    snapshot.nonce = 42;
    snapshot.data.insert("injected".into(), json!(true));

    let fresh = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(fresh.state, ChannelState::Opening);
    assert_eq!(fresh.nonce, 0);
    assert!(!fresh.data.contains_key("injected"));
}

#[tokio::test]
async fn listing_and_statistics_reflect_lifecycles() {
    let fixture = TestFixture::new();
    let manager = manager();

    let open = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&open.id))
        .await
        .unwrap();

    let closed = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&closed.id))
        .await
        .unwrap();
    manager
        .close_channel(fixture.close_request(&closed.id, true))
        .await
        .unwrap();

    let listing = manager
        .list_channels(ChannelFilter {
            state: Some(ChannelState::Open),
            ..ChannelFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.channels[0].id, open.id);

    let by_participant = manager
        .list_channels(ChannelFilter {
            participant: Some(fixture.candidate.address()),
            ..ChannelFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_participant.total, 2);

    let stats = manager.statistics().await.unwrap();
    assert_eq!(stats.total_channels, 2);
    assert_eq!(stats.active_channels, 1);
    assert_eq!(stats.closed_channels, 1);
}

#[tokio::test]
async fn backup_and_restore_roundtrip() {
    let fixture = TestFixture::new();
    let manager = manager();

    let channel = manager
        .create_channel(fixture.open_request(Some(48.0)))
        .await
        .unwrap();
    manager
        .accept_channel(fixture.accept_request(&channel.id))
        .await
        .unwrap();

    let backup = manager.backup_channel(&channel.id).await.unwrap();
    assert_eq!(backup.channel.state, ChannelState::Open);

    manager
        .update_state(fixture.signed_update(&channel.id, 1, data(&[("status", "late")])))
        .await
        .unwrap();

    manager.restore_channel(&channel.id).await.unwrap();
    let restored = manager.get_channel(&channel.id).await.unwrap();
    assert_eq!(restored.nonce, 0);
    assert!(!restored.data.contains_key("status"));
}
