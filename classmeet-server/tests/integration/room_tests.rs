use std::sync::Arc;

use classmeet_core::{RoomId, ServerMessage};
use classmeet_server::{BearerTokenGuard, BrokerCommand, MeetingClaims};
use jsonwebtoken::{EncodingKey, Header, encode};

use crate::integration::{TestBroker, init_tracing};
use crate::utils::addressed_to;

fn token_for(secret: &str, meetings: Option<Vec<String>>) -> String {
    let claims = MeetingClaims {
        user_id: "instructor-1".into(),
        exp: 4_000_000_000,
        iat: Some(1_700_000_000),
        meetings,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_join_lists_existing_peers() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;

    let delivered = broker.settle().await;
    let to_a = addressed_to(&delivered, &a);
    let to_b = addressed_to(&delivered, &b);

    assert!(matches!(
        &to_a[0],
        ServerMessage::Joined { room, peers } if room.as_str() == "ABC123" && peers.is_empty()
    ));
    assert!(matches!(
        &to_a[1],
        ServerMessage::PeerJoined { peer } if peer.connection_id == b
    ));
    assert_eq!(to_a.len(), 2);

    assert_eq!(to_b.len(), 1);
    let ServerMessage::Joined { peers, .. } = &to_b[0] else {
        panic!("expected joined, got {:?}", to_b[0]);
    };
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].connection_id, a);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_padded_room_code_joins_the_same_room() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "  ABC123 ").await;

    let delivered = broker.settle().await;
    let to_b = addressed_to(&delivered, &b);
    let ServerMessage::Joined { room, peers } = &to_b[0] else {
        panic!("expected joined, got {:?}", to_b[0]);
    };
    assert_eq!(room.as_str(), "ABC123");
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].connection_id, a);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_rejoin_same_room_is_idempotent() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker.join(b, "ABC123").await;
    let delivered = broker.settle().await;

    assert!(addressed_to(&delivered, &a).is_empty(), "no duplicate peer_joined");
    assert!(matches!(
        addressed_to(&delivered, &b).as_slice(),
        [ServerMessage::Joined { .. }]
    ));

    let stats = broker.handle.stats().await.unwrap();
    assert_eq!(stats.rooms, 1);
    assert_eq!(stats.connections, 2);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_invalid_room_is_rejected() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    broker.join(a, "").await;
    broker.join(a, "   ").await;
    broker.join(a, &"x".repeat(RoomId::MAX_LEN + 1)).await;

    let delivered = broker.settle().await;
    assert_eq!(delivered.len(), 3);
    for d in &delivered {
        assert_eq!(d.to, a);
        assert!(matches!(d.msg, ServerMessage::JoinRejected { .. }));
    }

    assert_eq!(broker.handle.stats().await.unwrap().rooms, 0);
    broker.shutdown().await;
}

#[tokio::test]
async fn test_full_room_rejects_newcomer() {
    init_tracing();
    let mut broker = TestBroker::start_with(Arc::new(classmeet_server::OpenAccess), 2);

    let a = broker.connect().await;
    let b = broker.connect().await;
    let c = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker.join(c, "ABC123").await;
    let delivered = broker.settle().await;

    assert_eq!(delivered.len(), 1, "members are not told about a refused join");
    let ServerMessage::JoinRejected { reason } = &delivered[0].msg else {
        panic!("expected join_rejected");
    };
    assert!(reason.contains("full"));

    // A member re-joining its own full room is still fine.
    broker.join(a, "ABC123").await;
    let delivered = broker.settle().await;
    assert!(matches!(delivered[0].msg, ServerMessage::Joined { .. }));

    broker.shutdown().await;
}

#[tokio::test]
async fn test_switching_rooms_notifies_old_members() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    let c = broker.connect().await;
    broker.join(a, "one").await;
    broker.join(b, "one").await;
    broker.join(c, "two").await;
    broker.settle().await;

    broker.join(a, "two").await;
    let delivered = broker.settle().await;

    assert_eq!(
        addressed_to(&delivered, &b),
        vec![ServerMessage::PeerLeft { connection_id: a }]
    );
    assert!(matches!(
        addressed_to(&delivered, &c).as_slice(),
        [ServerMessage::PeerJoined { peer }] if peer.connection_id == a
    ));

    broker.shutdown().await;
}

#[tokio::test]
async fn test_abrupt_disconnect_sends_single_peer_left() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker.send(BrokerCommand::Disconnect { connection_id: b }).await;
    // A transport reporting twice must not produce a second notification.
    broker.send(BrokerCommand::Disconnect { connection_id: b }).await;
    let delivered = broker.settle().await;

    assert_eq!(
        delivered.iter().map(|d| (d.to, d.msg.clone())).collect::<Vec<_>>(),
        vec![(a, ServerMessage::PeerLeft { connection_id: b })]
    );

    let stats = broker.handle.stats().await.unwrap();
    assert_eq!(stats.connections, 1);

    broker.send(BrokerCommand::Leave { connection_id: a }).await;
    broker.settle().await;
    assert_eq!(broker.handle.stats().await.unwrap().rooms, 0);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_bearer_guard_on_join() {
    init_tracing();
    let secret = "classmeet-test-secret";
    let mut broker = TestBroker::start_with(Arc::new(BearerTokenGuard::new(secret)), 0);

    let a = broker.connect().await;

    broker.join(a, "ABC123").await;
    let delivered = broker.settle().await;
    assert!(matches!(delivered[0].msg, ServerMessage::JoinRejected { .. }));

    broker
        .send(BrokerCommand::Join {
            connection_id: a,
            room: "ABC123".into(),
            token: Some(token_for(secret, Some(vec!["XYZ789".into()]))),
            meta: None,
        })
        .await;
    let delivered = broker.settle().await;
    assert!(matches!(delivered[0].msg, ServerMessage::JoinRejected { .. }));

    broker
        .send(BrokerCommand::Join {
            connection_id: a,
            room: "ABC123".into(),
            token: Some(token_for(secret, None)),
            meta: Some(serde_json::json!({ "name": "Ms. Lan" })),
        })
        .await;
    let delivered = broker.settle().await;
    assert!(matches!(delivered[0].msg, ServerMessage::Joined { .. }));

    broker.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_broker() {
    init_tracing();
    let broker = TestBroker::start();
    let handle = broker.handle.clone();

    broker.connect().await;
    broker.shutdown().await;

    assert!(handle.stats().await.is_err());
}
