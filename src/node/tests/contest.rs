//! Broadcast flood and unicast contest tests.

use super::*;
use crate::protocol::{BroadcastPayload, Command, ContestPayload, NotifyType, Request, Sender};

fn make_broadcast(from: u8, ttl: i8, id: u16) -> BroadcastPayload {
    BroadcastPayload {
        addr_from: Address::new(from),
        time_to_live: ttl,
        app: make_app(id, from, 255),
    }
}

fn make_contest(req: Command, node_addr: u8, id: u16) -> ContestPayload {
    ContestPayload {
        req,
        node_addr: Address::new(node_addr),
        app: make_app(id, node_addr, 255),
    }
}

// === Broadcast ===

#[tokio::test(start_paused = true)]
async fn test_broadcast_delivers_once_and_refloods() {
    let mut node = make_node(2);
    let seen = install_recorder(&mut node);
    let mut from_a = attach_neighbor(&mut node, 1);
    let mut from_c = attach_neighbor(&mut node, 3);
    let _server = attach_server(&mut node);

    let frame = Frame::new(Sender::Node, Request::Broadcast(make_broadcast(1, 3, 60)));
    node.dispatch(frame.clone(), None).await;

    // Delivered locally with broadcast metadata stamped
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].req_type, crate::protocol::AppRequest::Broadcast);
    }

    // Re-flooded away from the originator with a spent hop
    match recv_frame(&mut from_c).await.map(|f| f.request) {
        Some(Request::Broadcast(p)) => assert_eq!(p.time_to_live, 2),
        other => panic!("expected re-flooded Broadcast, got {:?}", other),
    }
    assert!(recv_frame(&mut from_a).await.is_none());

    // Replay: silently ignored
    node.dispatch(frame, None).await;
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(recv_frame(&mut from_c).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_last_hop_is_not_reflooded() {
    let mut node = make_node(2);
    let seen = install_recorder(&mut node);
    let mut from_c = attach_neighbor(&mut node, 3);
    let _server = attach_server(&mut node);

    node.dispatch(
        Frame::new(Sender::Node, Request::Broadcast(make_broadcast(1, 1, 61))),
        None,
    )
    .await;

    // Still delivered here, but the hop budget is exhausted
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(recv_frame(&mut from_c).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_dead_ttl_is_ignored() {
    let mut node = make_node(2);
    let seen = install_recorder(&mut node);
    let mut from_c = attach_neighbor(&mut node, 3);

    node.dispatch(
        Frame::new(Sender::Node, Request::Broadcast(make_broadcast(1, 0, 62))),
        None,
    )
    .await;

    assert!(seen.lock().unwrap().is_empty());
    assert!(node.dedup().is_empty());
    assert!(recv_frame(&mut from_c).await.is_none());
}

// === Unicast contest ===

#[tokio::test(start_paused = true)]
async fn test_server_unicast_opens_contest() {
    let mut node = make_node(1);
    let mut from_b = attach_neighbor(&mut node, 2);
    let mut from_c = attach_neighbor(&mut node, 3);

    node.dispatch(
        Frame::new(Sender::Server, Request::Unicast(make_broadcast(1, 3, 70))),
        None,
    )
    .await;

    for capture in [&mut from_b, &mut from_c] {
        match recv_frame(capture).await.map(|f| f.request) {
            Some(Request::UnicastContest(p)) => {
                assert_eq!(p.node_addr, Address::new(1));
                assert_eq!(p.app.req_type, crate::protocol::AppRequest::Unicast);
            }
            other => panic!("expected UnicastContest, got {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_contest_announcement_gets_direct_answer() {
    let mut node = make_node(2);
    let mut initiator = attach_neighbor(&mut node, 1);

    node.dispatch(
        Frame::new(
            Sender::Node,
            Request::UnicastContest(make_contest(Command::UnicastContest, 1, 71)),
        ),
        None,
    )
    .await;

    match recv_frame(&mut initiator).await.map(|f| f.request) {
        Some(Request::UnicastFirst(p)) => {
            assert_eq!(p.node_addr, Address::new(2));
            assert_eq!(p.req, Command::UnicastFirst);
        }
        other => panic!("expected UnicastFirst answer, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unicast_first_single_winner() {
    let mut node = make_node(1);
    let mut from_b = attach_neighbor(&mut node, 2);
    let mut from_c = attach_neighbor(&mut node, 3);
    let mut from_d = attach_neighbor(&mut node, 4);

    // Three near-simultaneous responses with the same id
    for responder in [2u8, 3, 4] {
        node.dispatch(
            Frame::new(
                Sender::Node,
                Request::UnicastFirst(make_contest(Command::UnicastFirst, responder, 72)),
            ),
            None,
        )
        .await;
    }

    // Exactly one Send reply, to the first responder
    match recv_frame(&mut from_b).await.map(|f| f.request) {
        Some(Request::Send(p)) => {
            assert_eq!(p.addr_to, Address::new(2));
            assert_eq!(p.addr_from, Address::new(1));
        }
        other => panic!("expected Send to the winner, got {:?}", other),
    }
    assert!(recv_frame(&mut from_b).await.is_none());
    assert!(recv_frame(&mut from_c).await.is_none());
    assert!(recv_frame(&mut from_d).await.is_none());

    let record = node.dedup().peek(72).unwrap();
    assert!(record.unicast_won);
}

#[tokio::test(start_paused = true)]
async fn test_unicast_notifications_suppressed_after_lost_contest() {
    let mut node = make_node(2);
    let _seen = install_recorder(&mut node);
    let mut server = attach_server(&mut node);

    // Lost contest: suppression flag set, notifications stay quiet
    node.set_stop_broadcast(true);
    let mut app = make_app(73, 1, 2);
    app.req_type = crate::protocol::AppRequest::Unicast;
    assert!(node.handle_app_request_chain(app.clone()).await);
    assert!(recv_frame(&mut server).await.is_none());

    // After a reset the same delivery reports both outcomes
    node.set_stop_broadcast(false);
    app.id = 74;
    assert!(node.handle_app_request_chain(app).await);

    let first = recv_frame(&mut server).await.map(|f| f.request);
    let second = recv_frame(&mut server).await.map(|f| f.request);
    match (first, second) {
        (Some(Request::Notify(a)), Some(Request::Notify(b))) => {
            assert_eq!(a.notify_type, NotifyType::GotMessage);
            assert_eq!(b.notify_type, NotifyType::UnicastHandled);
        }
        other => panic!("expected two notifies, got {:?}", other),
    }
}
