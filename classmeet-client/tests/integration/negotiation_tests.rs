use classmeet_client::{CallState, PeerEvent, SdpKind};
use classmeet_core::{ClientMessage, ConnectionId, Negotiation, NegotiationKind, ServerMessage};

use crate::integration::init_tracing;
use crate::utils::{
    Recorded, TestCall, answer_sdp, candidate, joined, offer_sdp, peer_joined, remote_candidate,
    signal_to,
};

#[tokio::test]
async fn test_existing_member_offers_to_newcomer() {
    init_tracing();
    let local = ConnectionId::new();
    let newcomer = ConnectionId::new();
    let mut call = TestCall::started_and_joined(local).await;

    call.manager.handle_server_message(peer_joined(newcomer)).await;

    let sent = call.sent();
    assert_eq!(sent.len(), 1);
    let (to, signal) = signal_to(&sent[0]).expect("offer expected");
    assert_eq!(to, Some(newcomer), "offer is addressed to the newcomer");
    assert_eq!(signal, &Negotiation::offer(offer_sdp(&newcomer)));
    assert_eq!(
        call.log.for_peer(&newcomer),
        vec![Recorded::CreatePeer(newcomer), Recorded::Offer(newcomer)]
    );
    assert_eq!(call.manager.state(), &CallState::Negotiating);
}

#[tokio::test]
async fn test_newcomer_answers_offer() {
    init_tracing();
    let member = ConnectionId::new();
    let mut call = TestCall::new();

    call.manager.start(Default::default()).await.unwrap();
    call.manager.join("ABC123", None, None).unwrap();
    call.manager.handle_server_message(joined(vec![member])).await;
    call.sent();
    assert_eq!(call.manager.session_count(), 0, "newcomer never offers");

    call.manager
        .handle_server_message(ServerMessage::Signal {
            from: member,
            signal: Negotiation::offer("remote-offer"),
        })
        .await;

    assert_eq!(
        call.log.for_peer(&member),
        vec![
            Recorded::CreatePeer(member),
            Recorded::RemoteDescription(member, SdpKind::Offer, "remote-offer".into()),
            Recorded::Answer(member),
        ]
    );
    assert_eq!(
        call.sent(),
        vec![ClientMessage::Signal {
            to: Some(member),
            signal: Negotiation::answer(answer_sdp(&member)),
        }]
    );
}

#[tokio::test]
async fn test_candidates_wait_for_remote_description_and_keep_order() {
    init_tracing();
    let peer = ConnectionId::new();
    let mut call = TestCall::started_and_joined(ConnectionId::new()).await;

    call.manager.handle_server_message(peer_joined(peer)).await;
    for n in 1..=3 {
        call.manager
            .handle_server_message(remote_candidate(peer, n))
            .await;
    }
    assert!(
        !call
            .log
            .entries()
            .iter()
            .any(|e| matches!(e, Recorded::Candidate(..))),
        "nothing applied before the answer"
    );

    call.manager
        .handle_server_message(ServerMessage::Signal {
            from: peer,
            signal: Negotiation::answer("remote-answer"),
        })
        .await;
    call.manager
        .handle_server_message(remote_candidate(peer, 4))
        .await;

    let after_offer: Vec<_> = call
        .log
        .for_peer(&peer)
        .into_iter()
        .skip_while(|e| !matches!(e, Recorded::RemoteDescription(..)))
        .collect();
    assert_eq!(
        after_offer,
        vec![
            Recorded::RemoteDescription(peer, SdpKind::Answer, "remote-answer".into()),
            Recorded::Candidate(peer, candidate(1).candidate),
            Recorded::Candidate(peer, candidate(2).candidate),
            Recorded::Candidate(peer, candidate(3).candidate),
            Recorded::Candidate(peer, candidate(4).candidate),
        ]
    );
}

#[tokio::test]
async fn test_candidate_without_session_is_dropped() {
    init_tracing();
    let stranger = ConnectionId::new();
    let mut call = TestCall::started_and_joined(ConnectionId::new()).await;

    call.manager
        .handle_server_message(remote_candidate(stranger, 1))
        .await;

    assert!(call.log.for_peer(&stranger).is_empty());
    assert!(!call.manager.has_session(&stranger));
    assert!(call.sent().is_empty());
}

#[tokio::test]
async fn test_answer_without_session_is_ignored() {
    init_tracing();
    let stranger = ConnectionId::new();
    let mut call = TestCall::started_and_joined(ConnectionId::new()).await;

    call.manager
        .handle_server_message(ServerMessage::Signal {
            from: stranger,
            signal: Negotiation::answer("late"),
        })
        .await;

    assert!(call.log.for_peer(&stranger).is_empty());
}

#[tokio::test]
async fn test_local_candidates_are_trickled_to_their_peer() {
    init_tracing();
    let peer = ConnectionId::new();
    let mut call = TestCall::started_and_joined(ConnectionId::new()).await;
    call.manager.handle_server_message(peer_joined(peer)).await;
    call.sent();

    call.manager
        .handle_peer_event(PeerEvent::LocalCandidate {
            peer,
            candidate: candidate(7),
        })
        .await;

    let sent = call.sent();
    assert_eq!(sent.len(), 1);
    let (to, signal) = signal_to(&sent[0]).unwrap();
    assert_eq!(to, Some(peer));
    assert_eq!(signal.kind, NegotiationKind::IceCandidate);
    assert_eq!(signal.decode_ice().unwrap(), candidate(7));
}

#[tokio::test]
async fn test_peer_joined_before_media_is_offered_after_capture() {
    init_tracing();
    let peer = ConnectionId::new();
    let mut call = TestCall::new();

    call.manager.join("ABC123", None, None).unwrap();
    call.manager.handle_server_message(joined(Vec::new())).await;
    call.manager.handle_server_message(peer_joined(peer)).await;
    call.sent();
    assert!(!call.manager.has_session(&peer), "no connection without media");

    call.manager.start(Default::default()).await.unwrap();

    assert!(call.manager.has_session(&peer));
    let sent = call.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(signal_to(&sent[0]).unwrap().0, Some(peer));
}

#[tokio::test]
async fn test_offer_before_media_is_answered_after_capture() {
    init_tracing();
    let member = ConnectionId::new();
    let mut call = TestCall::new();

    call.manager
        .handle_server_message(ServerMessage::Signal {
            from: member,
            signal: Negotiation::offer("early-offer"),
        })
        .await;
    assert!(call.log.entries().is_empty());

    call.manager.start(Default::default()).await.unwrap();

    assert!(call.log.contains(&Recorded::RemoteDescription(
        member,
        SdpKind::Offer,
        "early-offer".into()
    )));
    assert!(call.log.contains(&Recorded::Answer(member)));
}

#[tokio::test]
async fn test_candidates_behind_a_waiting_offer_are_kept() {
    init_tracing();
    let member = ConnectionId::new();
    let stranger = ConnectionId::new();
    let mut call = TestCall::new();

    call.manager
        .handle_server_message(ServerMessage::Signal {
            from: member,
            signal: Negotiation::offer("early-offer"),
        })
        .await;
    call.manager
        .handle_server_message(remote_candidate(member, 1))
        .await;
    call.manager
        .handle_server_message(remote_candidate(member, 2))
        .await;
    call.manager
        .handle_server_message(remote_candidate(stranger, 3))
        .await;
    assert!(call.log.entries().is_empty());

    call.manager.start(Default::default()).await.unwrap();

    let after_offer: Vec<_> = call
        .log
        .for_peer(&member)
        .into_iter()
        .skip_while(|e| !matches!(e, Recorded::RemoteDescription(..)))
        .filter(|e| !matches!(e, Recorded::Answer(_)))
        .collect();
    assert_eq!(
        after_offer,
        vec![
            Recorded::RemoteDescription(member, SdpKind::Offer, "early-offer".into()),
            Recorded::Candidate(member, candidate(1).candidate),
            Recorded::Candidate(member, candidate(2).candidate),
        ]
    );
    assert!(call.log.for_peer(&stranger).is_empty());
}

#[tokio::test]
async fn test_repeated_offer_while_waiting_starts_a_fresh_candidate_list() {
    init_tracing();
    let member = ConnectionId::new();
    let mut call = TestCall::new();

    for (sdp, n) in [("first-offer", 1), ("second-offer", 2)] {
        call.manager
            .handle_server_message(ServerMessage::Signal {
                from: member,
                signal: Negotiation::offer(sdp),
            })
            .await;
        call.manager
            .handle_server_message(remote_candidate(member, n))
            .await;
    }

    call.manager.start(Default::default()).await.unwrap();

    let log = call.log.for_peer(&member);
    assert!(!log.contains(&Recorded::RemoteDescription(
        member,
        SdpKind::Offer,
        "first-offer".into()
    )));
    assert!(!log.contains(&Recorded::Candidate(member, candidate(1).candidate)));
    assert!(log.contains(&Recorded::Candidate(member, candidate(2).candidate)));
    assert_eq!(call.log.count(&Recorded::Answer(member)), 1);
}

#[tokio::test]
async fn test_first_remote_track_connects_the_call_once() {
    init_tracing();
    let peer = ConnectionId::new();
    let mut call = TestCall::started_and_joined(ConnectionId::new()).await;
    call.manager.handle_server_message(peer_joined(peer)).await;
    call.take_events();

    // Audio and video each raise a track.
    call.manager
        .handle_peer_event(PeerEvent::RemoteTrack { peer })
        .await;
    call.manager
        .handle_peer_event(PeerEvent::RemoteTrack { peer })
        .await;

    assert_eq!(call.log.count(&Recorded::Bind(peer)), 1);
    assert!(call.manager.is_remote_bound(&peer));
    assert_eq!(call.manager.state(), &CallState::Connected);
    assert_eq!(call.states(), vec![CallState::Connected]);
}
