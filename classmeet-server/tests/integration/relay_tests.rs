use classmeet_core::{IceCandidate, Negotiation, NegotiationKind, ServerMessage};
use classmeet_server::BrokerCommand;

use crate::integration::{TestBroker, init_tracing};
use crate::utils::{addressed_to, wait_for_delivery};

const OFFER_SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";
const ANSWER_SDP: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=setup:active\r\n";

#[tokio::test]
async fn test_offer_and_answer_reach_the_other_member() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: None,
            signal: Negotiation::offer(OFFER_SDP),
        })
        .await;

    let msg = wait_for_delivery(&mut broker.rx, &b, |m| matches!(m, ServerMessage::Signal { .. }))
        .await
        .expect("offer not relayed");
    assert_eq!(
        msg,
        ServerMessage::Signal {
            from: a,
            signal: Negotiation::offer(OFFER_SDP),
        }
    );

    broker
        .send(BrokerCommand::Relay {
            connection_id: b,
            to: Some(a),
            signal: Negotiation::answer(ANSWER_SDP),
        })
        .await;

    let msg = wait_for_delivery(&mut broker.rx, &a, |m| matches!(m, ServerMessage::Signal { .. }))
        .await
        .expect("answer not relayed");
    let ServerMessage::Signal { from, signal } = msg else {
        unreachable!();
    };
    assert_eq!(from, b);
    assert_eq!(signal.kind, NegotiationKind::Answer);
    assert_eq!(signal.payload, ANSWER_SDP, "payload relayed byte-for-byte");

    // Nothing ever echoes back to the sender.
    let delivered = broker.settle().await;
    assert!(delivered.is_empty());
    assert!(
        broker
            .output
            .messages_for(&a)
            .await
            .iter()
            .all(|m| !matches!(m, ServerMessage::Signal { from, .. } if *from == a))
    );

    broker.shutdown().await;
}

#[tokio::test]
async fn test_lone_member_offer_goes_nowhere() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: None,
            signal: Negotiation::offer(OFFER_SDP),
        })
        .await;

    assert!(broker.settle().await.is_empty());
    broker.shutdown().await;
}

#[tokio::test]
async fn test_unjoined_sender_is_dropped() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: Some(b),
            signal: Negotiation::offer(OFFER_SDP),
        })
        .await;

    assert!(broker.settle().await.is_empty());
    broker.shutdown().await;
}

#[tokio::test]
async fn test_targeted_candidate_reaches_only_its_target() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    let c = broker.connect().await;
    for id in [a, b, c] {
        broker.join(id, "ABC123").await;
    }
    broker.settle().await;

    let candidate = IceCandidate {
        candidate: "candidate:1 1 UDP 2122252543 10.0.0.2 50000 typ host".into(),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    };
    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: Some(c),
            signal: Negotiation::ice(&candidate).unwrap(),
        })
        .await;

    let delivered = broker.settle().await;
    assert!(addressed_to(&delivered, &b).is_empty());
    let to_c = addressed_to(&delivered, &c);
    assert_eq!(to_c.len(), 1);
    let ServerMessage::Signal { signal, .. } = &to_c[0] else {
        panic!("expected signal");
    };
    assert_eq!(signal.decode_ice().unwrap(), candidate);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_target_outside_room_is_dropped() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    let outsider = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.join(outsider, "XYZ789").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: Some(outsider),
            signal: Negotiation::offer(OFFER_SDP),
        })
        .await;
    broker
        .send(BrokerCommand::Relay {
            connection_id: a,
            to: None,
            signal: Negotiation::offer(OFFER_SDP),
        })
        .await;

    let delivered = broker.settle().await;
    assert!(addressed_to(&delivered, &outsider).is_empty());
    assert_eq!(addressed_to(&delivered, &b).len(), 1);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_relay_keeps_send_order() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    for i in 0..20u16 {
        let candidate = IceCandidate {
            candidate: format!("candidate:{i}"),
            sdp_mid: None,
            sdp_m_line_index: Some(i),
        };
        broker
            .send(BrokerCommand::Relay {
                connection_id: a,
                to: None,
                signal: Negotiation::ice(&candidate).unwrap(),
            })
            .await;
    }

    let received: Vec<u16> = addressed_to(&broker.settle().await, &b)
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::Signal { signal, .. } => signal.decode_ice().ok(),
            _ => None,
        })
        .filter_map(|c| c.sdp_m_line_index)
        .collect();
    assert_eq!(received, (0..20).collect::<Vec<_>>());

    broker.shutdown().await;
}
