use classmeet_core::{ChatMessage, ServerMessage};
use classmeet_server::BrokerCommand;

use crate::integration::{TestBroker, init_tracing};
use crate::utils::addressed_to;

#[tokio::test]
async fn test_chat_reaches_everyone_but_the_author() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    let c = broker.connect().await;
    for id in [a, b, c] {
        broker.join(id, "ABC123").await;
    }
    broker.settle().await;

    broker
        .send(BrokerCommand::Chat {
            connection_id: a,
            text: "Good morning, class".into(),
            sent_at: Some(1_700_000_000_000),
        })
        .await;

    let delivered = broker.settle().await;
    let expected = ServerMessage::Chat(ChatMessage {
        from: a,
        text: "Good morning, class".into(),
        sent_at: 1_700_000_000_000,
    });

    assert!(addressed_to(&delivered, &a).is_empty());
    assert_eq!(addressed_to(&delivered, &b), vec![expected.clone()]);
    assert_eq!(addressed_to(&delivered, &c), vec![expected]);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_blank_chat_is_dropped() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    for text in ["", "   ", "\n\t"] {
        broker
            .send(BrokerCommand::Chat {
                connection_id: a,
                text: text.into(),
                sent_at: None,
            })
            .await;
    }

    assert!(broker.settle().await.is_empty());
    broker.shutdown().await;
}

#[tokio::test]
async fn test_missing_timestamp_is_stamped() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let b = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(b, "ABC123").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Chat {
            connection_id: b,
            text: "hi".into(),
            sent_at: None,
        })
        .await;

    let delivered = broker.settle().await;
    let ServerMessage::Chat(chat) = &delivered[0].msg else {
        panic!("expected chat");
    };
    assert_eq!(delivered[0].to, a);
    assert!(chat.sent_at > 0);

    broker.shutdown().await;
}

#[tokio::test]
async fn test_chat_stays_inside_the_room() {
    init_tracing();
    let mut broker = TestBroker::start();

    let a = broker.connect().await;
    let outsider = broker.connect().await;
    let unjoined = broker.connect().await;
    broker.join(a, "ABC123").await;
    broker.join(outsider, "XYZ789").await;
    broker.settle().await;

    broker
        .send(BrokerCommand::Chat {
            connection_id: a,
            text: "only for ABC123".into(),
            sent_at: None,
        })
        .await;
    broker
        .send(BrokerCommand::Chat {
            connection_id: unjoined,
            text: "anyone?".into(),
            sent_at: None,
        })
        .await;

    assert!(broker.settle().await.is_empty());
    assert_eq!(broker.output.count().await, 2, "only the two joined replies");

    broker.shutdown().await;
}
