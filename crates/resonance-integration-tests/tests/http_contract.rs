//! Status codes and payloads of the node's HTTP API.

use resonance_integration_tests::{TestNode, TEST_KEY};
use serde_json::{json, Value};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn health_needs_no_key() {
    let node = TestNode::start().await.unwrap();
    let resp = client()
        .get(format!("{}/health", node.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn api_requires_bearer_key() {
    let node = TestNode::start().await.unwrap();
    let url = format!("{}/api/v1/entries", node.url());

    let missing = client().get(&url).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = client().get(&url).bearer_auth("nope").send().await.unwrap();
    assert_eq!(wrong.status(), 401);

    let ok = client().get(&url).bearer_auth(TEST_KEY).send().await.unwrap();
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.json::<Value>().await.unwrap(), json!([]));
}

#[tokio::test]
async fn create_assigns_id_and_timestamp() {
    let node = TestNode::start().await.unwrap();
    let resp = client()
        .post(format!("{}/api/v1/entries", node.url()))
        .bearer_auth(TEST_KEY)
        .json(&json!({"x": "Hello", "y": "Trust", "z": "r", "score": 61, "timestamp": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let body: Value = resp.json().await.unwrap();
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["timestamp"].as_u64().unwrap() > 1);
    assert_eq!(body["score"], 61);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let node = TestNode::start().await.unwrap();
    let url = format!("{}/api/v1/entries", node.url());

    for body in [
        json!({"x": "Hello", "y": "Trust", "z": "r", "score": 101}),
        json!({"x": "Hello", "y": "Trust", "z": "r", "score": -1}),
        json!({"x": "   ", "y": "Trust", "z": "r", "score": 50}),
    ] {
        let resp = client()
            .post(&url)
            .bearer_auth(TEST_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "{}", body);
    }
    assert_eq!(node.state().storage.len().unwrap(), 0);
}

#[tokio::test]
async fn field_length_is_bounded_on_the_wire() {
    let node = TestNode::start().await.unwrap();
    let url = format!("{}/api/v1/entries", node.url());
    let at_limit = "é".repeat(resonance_node::api::MAX_FIELD_CHARS);
    let over = "a".repeat(resonance_node::api::MAX_FIELD_CHARS + 1);

    for (body, status) in [
        (json!({"x": at_limit, "y": "Trust", "z": "r", "score": 50}), 201),
        (json!({"x": over, "y": "Trust", "z": "r", "score": 50}), 400),
        (json!({"x": "Hello", "y": over, "z": "r", "score": 50}), 400),
        (json!({"x": "Hello", "y": "Trust", "z": over, "score": 50}), 400),
    ] {
        let resp = client()
            .post(&url)
            .bearer_auth(TEST_KEY)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), status);
    }
    assert_eq!(node.state().storage.len().unwrap(), 1);
}

#[tokio::test]
async fn only_newest_first_order_is_supported() {
    let node = TestNode::start().await.unwrap();
    let resp = client()
        .get(format!("{}/api/v1/entries?order=timestamp-asc", node.url()))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn delete_returns_empty_object() {
    let node = TestNode::start().await.unwrap();
    let resp = client()
        .delete(format!("{}/api/v1/entries", node.url()))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), json!({}));
}

#[tokio::test]
async fn presence_count_starts_empty() {
    let node = TestNode::start().await.unwrap();
    let resp = client()
        .get(format!("{}/api/v1/presence/presence", node.url()))
        .bearer_auth(TEST_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.json::<Value>().await.unwrap(),
        json!({"topic": "presence", "count": 0})
    );
}
