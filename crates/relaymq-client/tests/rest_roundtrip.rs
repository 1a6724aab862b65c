//! REST-path integration tests against an in-process broker stub.
//!
//! The stub implements the broker's three message routes (publish, pull,
//! acknowledge) with an in-memory queue per topic, plus failure injection
//! for the retry tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use relaymq_client::{ClientError, Message, RelayClient, RetryPolicy, SubscriptionEvent};
use tokio::time::timeout;

#[derive(Default)]
struct BrokerStub {
    queues: Mutex<HashMap<String, VecDeque<Message>>>,
    unacked: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    publish_requests: AtomicUsize,
    fail_publishes: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
}

fn authorization(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn publish(
    State(stub): State<Arc<BrokerStub>>,
    Path((_project, topic)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    stub.publish_requests.fetch_add(1, Ordering::SeqCst);

    let auth = authorization(&headers);
    *stub.last_authorization.lock().unwrap() = Some(auth.clone());
    if auth.ends_with(":wrong") {
        return (StatusCode::UNAUTHORIZED, "bad token".to_string());
    }

    if stub
        .fail_publishes
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
            remaining.checked_sub(1)
        })
        .is_ok()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "try again".to_string());
    }

    let id = format!("msg-{}", stub.next_id.fetch_add(1, Ordering::SeqCst));
    stub.queues
        .lock()
        .unwrap()
        .entry(topic)
        .or_default()
        .push_back(Message {
            message_id: id.clone(),
            content: body,
        });
    (
        StatusCode::OK,
        serde_json::json!({ "MessageID": id }).to_string(),
    )
}

async fn pull(
    State(stub): State<Arc<BrokerStub>>,
    Path((_project, topic)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let count: usize = params
        .get("count")
        .and_then(|value| value.parse().ok())
        .unwrap_or(1);

    let mut delivered = Vec::new();
    {
        let mut queues = stub.queues.lock().unwrap();
        let queue = queues.entry(topic).or_default();
        for _ in 0..count {
            match queue.pop_front() {
                Some(message) => {
                    stub.unacked.lock().unwrap().insert(message.message_id.clone());
                    delivered.push(message);
                }
                None => break,
            }
        }
    }
    (
        StatusCode::OK,
        serde_json::json!({ "messages": delivered }).to_string(),
    )
}

async fn acknowledge(
    State(stub): State<Arc<BrokerStub>>,
    Path((_project, _topic)): Path<(String, String)>,
    body: String,
) -> StatusCode {
    let parsed: serde_json::Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    if let Some(ids) = parsed.get("MessageID").and_then(|value| value.as_array()) {
        let mut unacked = stub.unacked.lock().unwrap();
        for id in ids.iter().filter_map(|value| value.as_str()) {
            unacked.remove(id);
        }
    }
    StatusCode::OK
}

async fn start_stub() -> (Arc<BrokerStub>, RelayClient) {
    let stub = Arc::new(BrokerStub::default());
    let app = Router::new()
        .route(
            "/{project}/{topic}/message",
            get(pull).post(publish).delete(acknowledge),
        )
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = RelayClient::builder()
        .host(format!("http://{addr}"))
        .project_id("demo")
        .retry_policy(RetryPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
            6,
        ))
        .build()
        .unwrap();
    (stub, client)
}

#[tokio::test]
async fn publish_pull_ack_roundtrip_sees_every_id_once() {
    let (stub, client) = start_stub().await;
    let producer = client.producer("producer-1", "token");
    let consumer = client.consumer("consumer-1", "token");

    let mut published = HashSet::new();
    for i in 0..10 {
        let id = producer.publish("orders", format!("payload {i}")).await.unwrap();
        published.insert(id);
    }
    assert_eq!(published.len(), 10);

    let mut observed = Vec::new();
    loop {
        let batch = consumer.pull("orders", Some(4), Some(1)).await.unwrap();
        if batch.is_empty() {
            break;
        }
        let ids: Vec<_> = batch.iter().map(|m| m.message_id.clone()).collect();
        consumer.acknowledge("orders", &ids).await.unwrap();
        observed.extend(batch);
    }

    let observed_ids: HashSet<_> = observed.iter().map(|m| m.message_id.clone()).collect();
    assert_eq!(observed_ids, published, "each published id pulled exactly once");
    assert_eq!(observed.len(), 10, "no id delivered twice");
    assert!(stub.unacked.lock().unwrap().is_empty(), "everything acknowledged");
}

#[tokio::test]
async fn pull_from_an_empty_topic_returns_an_empty_list() {
    let (_stub, client) = start_stub().await;
    let consumer = client.consumer("consumer-1", "token");

    let messages = consumer.pull("nothing-here", Some(10), Some(1)).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn transient_server_errors_are_retried_until_success() {
    let (stub, client) = start_stub().await;
    stub.fail_publishes.store(3, Ordering::SeqCst);

    let producer = client.producer("producer-1", "token");
    let id = producer.publish("orders", "eventually").await.unwrap();
    assert!(id.starts_with("msg-"));

    // three 503s retried, fourth attempt succeeded
    assert_eq!(stub.publish_requests.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn auth_failures_surface_immediately_without_retry() {
    let (stub, client) = start_stub().await;
    let producer = client.producer("producer-1", "wrong");

    let err = producer.publish("orders", "nope").await.unwrap_err();
    match err {
        ClientError::Api { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad token");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(stub.publish_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn credentials_travel_as_id_colon_token() {
    let (stub, client) = start_stub().await;
    let producer = client.producer("producer-7", "s3cret");
    producer.publish("orders", "hello").await.unwrap();

    assert_eq!(
        stub.last_authorization.lock().unwrap().as_deref(),
        Some("producer-7:s3cret")
    );
}

#[tokio::test]
async fn acknowledge_is_fire_and_forget_and_idempotent() {
    let (_stub, client) = start_stub().await;
    let producer = client.producer("producer-1", "token");
    let consumer = client.consumer("consumer-1", "token");

    producer.publish("orders", "one").await.unwrap();
    let batch = consumer.pull("orders", Some(1), Some(1)).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|m| m.message_id.clone()).collect();

    consumer.acknowledge("orders", &ids).await.unwrap();
    // re-acknowledging an already-acknowledged id is not an error
    consumer.acknowledge("orders", &ids).await.unwrap();
}

#[tokio::test]
async fn subscription_acknowledges_over_rest_without_an_open_socket() {
    let (stub, client) = start_stub().await;
    let producer = client.producer("producer-1", "token");
    let consumer = client.consumer("consumer-1", "token");

    producer.publish("orders", "pushed?").await.unwrap();
    let batch = consumer.pull("orders", Some(1), Some(1)).await.unwrap();
    let ids: Vec<_> = batch.iter().map(|m| m.message_id.clone()).collect();

    // The stub has no streaming route, so the handshake is rejected with
    // 404 and the subscription closes without ever connecting.
    let mut subscription = client.subscribe("consumer-1", "token", "orders", 1).unwrap();
    match timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
    {
        Some(SubscriptionEvent::Error(err)) => assert_eq!(err.status_code(), Some(404)),
        other => panic!("expected a not-found error event, got {other:?}"),
    }

    // Acknowledgement still works: it never depends on the socket.
    subscription.acknowledge(&ids).await.unwrap();
    assert!(stub.unacked.lock().unwrap().is_empty());
}
