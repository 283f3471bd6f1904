//! Integration tests for pipe transports against a mock media node.
//!
//! Covers the transport lifecycle, the connect/produce/consume requests and
//! the node notifications handled by the transport's middleware.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use common::types::RoomId;
use rc_test_utils::{
    eventually, flush, test_rtp_parameters, MockMediaNode, MockReply, TestMediaNode,
};
use room_controller::errors::RcError;
use room_controller::media::messages::{methods, PipeTransportInfo};
use room_controller::media::{
    MediaKind, MediaNode, MediaNodeConnection, NodeChannel, NodeMessage, PipeConnectParams,
    PipeProduceParams, PipeTransport, Router, RouterOptions,
};
use serde_json::json;

async fn setup() -> (Arc<MediaNode>, Arc<MockMediaNode>, Arc<Router>) {
    let (node, mock) = TestMediaNode::new("mn-1").build_mocked();
    let router = node.get_router(&RoomId::new("room-1")).await.unwrap();
    (node, mock, router)
}

fn produce_params(producer_id: &str) -> PipeProduceParams {
    PipeProduceParams {
        producer_id: producer_id.to_string(),
        kind: MediaKind::Audio,
        paused: false,
        rtp_parameters: test_rtp_parameters(),
    }
}

fn addressed(transport: &PipeTransport) -> serde_json::Value {
    json!({
        "routerId": transport.router_id(),
        "pipeTransportId": transport.id(),
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_new_transport_is_open_and_registered() {
    let (_node, mock, router) = setup().await;
    let middlewares_before = router.connection().pipeline().len();

    let transport = router.create_pipe_transport(false).await.unwrap();

    assert!(!transport.closed());
    assert_eq!(transport.ip(), "127.0.0.1");
    assert_eq!(transport.router_id(), router.id());
    assert!(Arc::ptr_eq(&transport.router().unwrap(), &router));
    assert!(router.pipe_transport(transport.id()).is_some());
    assert_eq!(router.connection().pipeline().len(), middlewares_before + 1);

    let requests = mock.requests_for(methods::CREATE_PIPE_TRANSPORT);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["routerId"], router.id());
    assert_eq!(requests[0]["internal"], false);
}

#[tokio::test]
async fn test_close_notifies_node_exactly_once() {
    let (_node, mock, router) = setup().await;
    let middlewares_before = router.connection().pipeline().len();
    let transport = router.create_pipe_transport(false).await.unwrap();

    transport.close().await;
    transport.close().await;
    flush(router.connection()).await;

    assert!(transport.closed());
    let notifications = mock.notifications_for(methods::CLOSE_PIPE_TRANSPORT);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0], addressed(&transport));
    assert_eq!(router.connection().pipeline().len(), middlewares_before);
    assert!(router.pipe_transport(transport.id()).is_none());
}

#[tokio::test]
async fn test_close_closes_owned_producers_and_consumers() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let producer = transport.produce(produce_params("producer-1")).await.unwrap();
    let consumer = transport.consume("producer-2").await.unwrap();

    transport.close().await;
    flush(router.connection()).await;

    assert!(producer.closed());
    assert!(consumer.closed());
    assert_eq!(transport.pipe_producer_count(), 0);
    assert_eq!(transport.pipe_consumer_count(), 0);
    // The node closes its children with the transport.
    assert!(mock.notifications_for(methods::CLOSE_PIPE_PRODUCER).is_empty());
    assert!(mock.notifications_for(methods::CLOSE_PIPE_CONSUMER).is_empty());
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_connect_sends_remote_endpoint() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();

    transport
        .connect(PipeConnectParams {
            ip: "10.1.2.3".to_string(),
            port: 40123,
            srtp_parameters: None,
        })
        .await
        .unwrap();

    let requests = mock.requests_for(methods::CONNECT_PIPE_TRANSPORT);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["routerId"], router.id());
    assert_eq!(requests[0]["pipeTransportId"], transport.id());
    assert_eq!(requests[0]["ip"], "10.1.2.3");
    assert_eq!(requests[0]["port"], 40123);
}

#[tokio::test]
async fn test_connect_rejected_is_connect_failed() {
    let (_node, mock, router) = setup().await;
    mock.on_request(methods::CONNECT_PIPE_TRANSPORT, |_| {
        MockReply::Err("port unreachable".to_string())
    });
    let transport = router.create_pipe_transport(false).await.unwrap();

    let result = transport.connect(transport.connect_params()).await;

    match result {
        Err(RcError::ConnectFailed(reason)) => assert_eq!(reason, "port unreachable"),
        other => unreachable!("expected ConnectFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_produce_returns_tracked_producer() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();

    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    assert_eq!(producer.id(), "producer-1");
    assert_eq!(producer.kind(), MediaKind::Audio);
    assert!(!producer.paused());
    assert!(!producer.closed());
    assert!(transport.pipe_producer("producer-1").is_some());

    let requests = mock.requests_for(methods::CREATE_PIPE_PRODUCER);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["producerId"], "producer-1");
    assert_eq!(requests[0]["kind"], "audio");
    assert_eq!(requests[0]["rtpParameters"], test_rtp_parameters());
}

#[tokio::test]
async fn test_produce_keys_producer_by_node_assigned_id() {
    let (_node, mock, router) = setup().await;
    mock.on_request(methods::CREATE_PIPE_PRODUCER, |_| {
        MockReply::Ok(json!({ "id": "remote-42" }))
    });
    let transport = router.create_pipe_transport(false).await.unwrap();

    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    assert_eq!(producer.id(), "remote-42");
    assert!(transport.pipe_producer("remote-42").is_some());
    assert!(transport.pipe_producer("producer-1").is_none());
    assert!(Arc::ptr_eq(&producer.router().unwrap(), &router));
}

#[tokio::test]
async fn test_produce_without_producer_id_fails_locally() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();

    let result = transport.produce(produce_params("")).await;

    assert!(matches!(result, Err(RcError::ProduceFailed(_))));
    assert!(mock.requests_for(methods::CREATE_PIPE_PRODUCER).is_empty());
}

#[tokio::test]
async fn test_operations_after_close_are_rejected() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    transport.close().await;

    let produced = transport.produce(produce_params("producer-1")).await;
    let consumed = transport.consume("producer-1").await;
    let connected = transport.connect(transport.connect_params()).await;

    assert!(matches!(produced, Err(RcError::TransportClosed(_))));
    assert!(matches!(consumed, Err(RcError::TransportClosed(_))));
    assert!(matches!(connected, Err(RcError::TransportClosed(_))));
    assert!(mock.requests_for(methods::CREATE_PIPE_PRODUCER).is_empty());
}

#[tokio::test]
async fn test_consume_returns_tracked_consumer() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();

    let consumer = transport.consume("producer-9").await.unwrap();

    assert_eq!(consumer.producer_id(), "producer-9");
    assert_eq!(consumer.kind(), MediaKind::Video);
    assert!(!consumer.producer_paused());
    assert!(transport.pipe_consumer(consumer.id()).is_some());
    assert_eq!(mock.requests_for(methods::CREATE_PIPE_CONSUMER).len(), 1);
}

#[tokio::test]
async fn test_consume_builds_consumer_from_reply() {
    let (_node, mock, router) = setup().await;
    let rtp_parameters = json!({ "codecs": [{ "mimeType": "audio/opus", "clockRate": 48000 }] });
    let reply = json!({
        "id": "pipe-consumer-7",
        "kind": "audio",
        "producerPaused": true,
        "rtpParameters": rtp_parameters,
    });
    mock.on_request(methods::CREATE_PIPE_CONSUMER, move |_| MockReply::Ok(reply.clone()));
    let transport = router.create_pipe_transport(false).await.unwrap();

    let consumer = transport.consume("producer-3").await.unwrap();

    assert_eq!(consumer.id(), "pipe-consumer-7");
    assert_eq!(consumer.kind(), MediaKind::Audio);
    assert!(consumer.producer_paused());
    assert_eq!(consumer.rtp_parameters(), &rtp_parameters);
    assert_eq!(consumer.producer_id(), "producer-3");
    assert!(Arc::ptr_eq(&consumer.router().unwrap(), &router));
    assert!(transport.pipe_consumer("pipe-consumer-7").is_some());

    let requests = mock.requests_for(methods::CREATE_PIPE_CONSUMER);
    assert_eq!(
        requests,
        vec![json!({
            "routerId": router.id(),
            "pipeTransportId": transport.id(),
            "producerId": "producer-3",
        })]
    );
}

#[tokio::test]
async fn test_consume_rejected_is_consume_failed() {
    let (_node, mock, router) = setup().await;
    mock.on_request(methods::CREATE_PIPE_CONSUMER, |_| {
        MockReply::Err("producer not found".to_string())
    });
    let transport = router.create_pipe_transport(false).await.unwrap();

    let result = transport.consume("missing").await;

    assert!(matches!(result, Err(RcError::ConsumeFailed(_))));
    assert_eq!(transport.pipe_consumer_count(), 0);
}

#[tokio::test]
async fn test_producer_pause_and_resume() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    producer.pause().await.unwrap();
    assert!(producer.paused());
    producer.resume().await.unwrap();
    assert!(!producer.paused());

    let pauses = mock.requests_for(methods::PAUSE_PIPE_PRODUCER);
    assert_eq!(pauses.len(), 1);
    assert_eq!(pauses[0]["pipeProducerId"], "producer-1");
    assert_eq!(mock.requests_for(methods::RESUME_PIPE_PRODUCER).len(), 1);
}

#[tokio::test]
async fn test_producer_close_notifies_and_detaches() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    producer.close().await;
    producer.close().await;
    flush(router.connection()).await;

    assert!(producer.closed());
    assert!(transport.pipe_producer("producer-1").is_none());
    assert_eq!(mock.notifications_for(methods::CLOSE_PIPE_PRODUCER).len(), 1);
    assert!(matches!(producer.pause().await, Err(RcError::TransportClosed(_))));
}

// ============================================================================
// Node notifications
// ============================================================================

#[tokio::test]
async fn test_remote_transport_closed_closes_without_notify() {
    let (_node, mock, router) = setup().await;
    let middlewares_before = router.connection().pipeline().len();
    let transport = router.create_pipe_transport(false).await.unwrap();
    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    mock.send_notification(methods::PIPE_TRANSPORT_CLOSED, addressed(&transport))
        .await;
    eventually("transport closed", || transport.closed()).await;
    flush(router.connection()).await;

    assert!(producer.closed());
    assert!(router.pipe_transport(transport.id()).is_none());
    assert_eq!(router.connection().pipeline().len(), middlewares_before);
    assert!(mock.notifications_for(methods::CLOSE_PIPE_TRANSPORT).is_empty());
}

#[tokio::test]
async fn test_remote_event_for_other_transport_passes_through() {
    let (_node, mock, router) = setup().await;
    let first = router.create_pipe_transport(false).await.unwrap();
    let second = router.create_pipe_transport(false).await.unwrap();

    mock.send_notification(
        methods::PIPE_TRANSPORT_CLOSED,
        json!({ "routerId": router.id(), "pipeTransportId": "someone-else" }),
    )
    .await;
    mock.send_notification(methods::PIPE_TRANSPORT_CLOSED, addressed(&second))
        .await;
    eventually("second transport closed", || second.closed()).await;

    assert!(!first.closed());
}

#[tokio::test]
async fn test_remote_producer_closed_forgets_producer() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let producer = transport.produce(produce_params("producer-1")).await.unwrap();

    let mut data = addressed(&transport);
    data["pipeProducerId"] = json!("producer-1");
    mock.send_notification(methods::PIPE_PRODUCER_CLOSED, data).await;
    eventually("producer closed", || producer.closed()).await;

    assert!(transport.pipe_producer("producer-1").is_none());
    assert!(!transport.closed());
}

#[tokio::test]
async fn test_remote_consumer_events() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let consumer = transport.consume("producer-1").await.unwrap();

    let mut data = addressed(&transport);
    data["pipeConsumerId"] = json!(consumer.id());

    mock.send_notification(methods::PIPE_CONSUMER_PAUSED, data.clone())
        .await;
    eventually("consumer paused", || consumer.producer_paused()).await;

    mock.send_notification(methods::PIPE_CONSUMER_RESUMED, data.clone())
        .await;
    eventually("consumer resumed", || !consumer.producer_paused()).await;

    mock.send_notification(methods::PIPE_CONSUMER_CLOSED, data).await;
    eventually("consumer closed", || consumer.closed()).await;
    assert_eq!(transport.pipe_consumer_count(), 0);
}

// ============================================================================
// Close while work is in flight
// ============================================================================

#[tokio::test]
async fn test_produce_on_transport_closed_in_flight() {
    let (_node, mock, router) = setup().await;
    let transport = router.create_pipe_transport(false).await.unwrap();
    let closer = Arc::clone(&transport);
    mock.on_request(methods::CREATE_PIPE_PRODUCER, move |data| {
        let transport = Arc::clone(&closer);
        tokio::spawn(async move { transport.close().await });
        MockReply::Ok(json!({ "id": data["producerId"] }))
    });

    let result = transport.produce(produce_params("producer-1")).await;
    flush(router.connection()).await;

    assert!(matches!(result, Err(RcError::TransportClosed(_))));
    assert!(transport.closed());
    assert_eq!(transport.pipe_producer_count(), 0);
    let closed = mock.notifications_for(methods::CLOSE_PIPE_PRODUCER);
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0]["pipeProducerId"], "producer-1");
}

#[tokio::test]
async fn test_close_releases_transport_before_notify_is_sent() {
    let (node, _mock) = TestMediaNode::new("mn-1").build_mocked();
    // Never attached until the end: the closePipeTransport notify stays queued.
    let connection = MediaNodeConnection::new(node.id().clone(), Duration::from_secs(5));
    let router = Router::new(RouterOptions {
        id: "router-1".to_string(),
        media_node: Arc::clone(&node),
        connection: Arc::clone(&connection),
        rtp_capabilities: json!({}),
    });
    let transport = PipeTransport::new(
        &router,
        PipeTransportInfo {
            id: "pipe-transport-1".to_string(),
            ip: "127.0.0.1".to_string(),
            port: 40000,
            srtp_parameters: None,
        },
    );
    assert_eq!(connection.pipeline().len(), 2);

    let closing = tokio::spawn({
        let transport = Arc::clone(&transport);
        async move { transport.close().await }
    });
    tokio::task::yield_now().await;

    assert!(!closing.is_finished());
    assert!(transport.closed());
    assert_eq!(connection.pipeline().len(), 1);

    let (channel, mut remote) = NodeChannel::pair(8);
    connection.attach(channel);
    closing.await.unwrap();

    match remote.inbound.recv().await {
        Some(NodeMessage::Notification { method, data }) => {
            assert_eq!(method, methods::CLOSE_PIPE_TRANSPORT);
            assert_eq!(data, addressed(&transport));
        }
        other => unreachable!("expected closePipeTransport, got {other:?}"),
    }
}
