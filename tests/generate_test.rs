//! Wiremock integration tests for `GatewayClient::generate`.
//!
//! Each test gets its own mock backend, pool, and cache so that the
//! process-wide singletons never leak state between tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use vedanta::{
    CancellationToken, ClientConfig, ConnectionPool, ErrorKind, GatewayClient, GenerationOptions, Message,
    PoolConfig, RequestCache, Vedanta, VedantaError,
};
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "llama3.2",
        "message": { "role": "assistant", "content": content },
        "done": true
    }))
}

fn client_for(server: &MockServer, max_retries: u32) -> GatewayClient {
    Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .max_retries(max_retries)
        .retry_base_delay(Duration::from_millis(5))
        .request_timeout(Duration::from_secs(5))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .expect("client should build")
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn happy_path_then_cache_hit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("Hello"))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let opts = GenerationOptions::default();

    let first = client.generate("Hi", &[], &opts).await.unwrap();
    assert_eq!(first, "Hello");
    assert_eq!(request_count(&server).await, 1);

    let second = client.generate("Hi", &[], &opts).await.unwrap();
    assert_eq!(second, "Hello");
    assert_eq!(request_count(&server).await, 1, "second call must be a cache hit");
}

#[tokio::test]
async fn prefilled_cache_short_circuits_network() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3);
    let history = vec![Message::user("a"), Message::assistant("b")];
    let opts = GenerationOptions::default().temperature(0.2);

    let config = ClientConfig::default();
    let key = vedanta::make_scoped_key(
        &config.model,
        &config.system_prompt,
        "question",
        &history,
        &opts,
    );
    client.cache().put(key, "cached answer").await;

    // Structurally equal but distinct history.
    let same_history = vec![Message::user("a"), Message::assistant("b")];
    let text = client
        .generate("question", &same_history, &opts)
        .await
        .unwrap();

    assert_eq!(text, "cached answer");
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn empty_or_blank_prompt_is_invalid_input() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3);
    let opts = GenerationOptions::default();

    for prompt in ["", "   ", "\n\t"] {
        let err = client.generate(prompt, &[], &opts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn out_of_range_options_are_invalid_input() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3);

    let bad = [
        GenerationOptions::default().temperature(1.5),
        GenerationOptions::default().max_tokens(0),
        GenerationOptions::default().top_p(0.0),
    ];
    for opts in bad {
        let err = client.generate("Hi", &[], &opts).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn request_carries_headers_and_conversation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("authorization", "Bearer secret-key"))
        .and(header("content-type", "application/json"))
        .and(header_exists("user-agent"))
        .respond_with(reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .credential("secret-key")
        .system_prompt("You are a nephrology assistant.")
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let history = vec![
        Message::user("My creatinine is 1.4"),
        Message::assistant("That is slightly elevated."),
    ];
    let opts = GenerationOptions::new()
        .temperature(0.3)
        .max_tokens(128)
        .top_p(0.8);
    client.generate("What next?", &history, &opts).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(body["model"], "llama3.2");
    assert_eq!(body["stream"], false);
    assert_eq!(body["options"]["num_predict"], 128);
    assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    assert!((body["options"]["top_p"].as_f64().unwrap() - 0.8).abs() < 1e-6);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are a nephrology assistant.");
    assert_eq!(messages[1]["content"], "My creatinine is 1.4");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[3]["role"], "user");
    assert_eq!(messages[3]["content"], "What next?");
}

#[tokio::test]
async fn no_authorization_header_without_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("ok"))
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn transient_timeout_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("late").set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("ok"))
        .mount(&server)
        .await;

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .max_retries(1)
        .retry_base_delay(Duration::from_millis(5))
        .request_timeout(Duration::from_millis(100))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let text = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(text, "ok");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn always_timing_out_exhausts_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("never").set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .max_retries(2)
        .retry_base_delay(Duration::from_millis(5))
        .request_timeout(Duration::from_millis(50))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    match &err {
        VedantaError::Exhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last.kind(), ErrorKind::Timeout);
        }
        other => panic!("expected Exhausted(Timeout), got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn service_unavailable_exhausts_with_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Exhausted);
    assert_eq!(err.root_cause().kind(), ErrorKind::Backend);
    assert!(err.is_unavailable());
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid options" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 5);
    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    match err {
        VedantaError::RequestRejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid options");
        }
        other => panic!("expected RequestRejected, got {other:?}"),
    }
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("after the wait"))
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let start = Instant::now();
    let text = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(text, "after the wait");
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn malformed_success_body_is_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy page</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, 1);
    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.root_cause().kind(), ErrorKind::Backend);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn failures_never_poison_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("recovered"))
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let opts = GenerationOptions::default();

    assert!(client.generate("Hi", &[], &opts).await.is_err());
    client.cache().run_pending_tasks().await;
    assert!(client.cache().is_empty());

    let text = client.generate("Hi", &[], &opts).await.unwrap();
    assert_eq!(text, "recovered");
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn connection_refused_is_connection_error() {
    // Bind and drop a listener to get a port with nothing behind it.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(uri)
        .max_retries(1)
        .retry_base_delay(Duration::from_millis(5))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exhausted);
    assert_eq!(err.root_cause().kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn closed_pool_fails_fast() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3);

    client.close();
    client.close();

    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn concurrent_calls_share_a_small_pool() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("pong").set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let pool = Arc::new(ConnectionPool::new(&PoolConfig::new().max_connections(2)).unwrap());
    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .pool(pool.clone())
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .generate(&format!("ping {i}"), &[], &GenerationOptions::default())
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "pong");
    }

    assert_eq!(request_count(&server).await, 10);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_normalised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(format!("{}/", server.uri()))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    assert_eq!(
        client
            .generate("Hi", &[], &GenerationOptions::default())
            .await
            .unwrap(),
        "ok"
    );
}

#[tokio::test]
async fn cancellation_aborts_in_flight_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("too late").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = client_for(&server, 3);
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = client
        .generate_with_cancel("Hi", &[], &GenerationOptions::default(), &token)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(2));
    client.cache().run_pending_tasks().await;
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn already_cancelled_token_sends_nothing() {
    let server = MockServer::start().await;
    let client = client_for(&server, 3);
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .generate_with_cancel("Hi", &[], &GenerationOptions::default(), &token)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn embed_returns_first_vector_and_caches_it() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "embeddings": [[0.25, -0.5, 1.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 0);
    let first = client.embed("kidney function").await.unwrap();
    let second = client.embed("kidney function").await.unwrap();

    assert_eq!(first, vec![0.25, -0.5, 1.0]);
    assert_eq!(first, second);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "llama3.2");
    assert_eq!(body["input"], "kidney function");
}

#[tokio::test]
async fn embed_rejects_blank_text() {
    let server = MockServer::start().await;
    let client = client_for(&server, 0);
    let err = client.embed("  ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn shared_cache_is_scoped_by_model_and_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "model-a" })))
        .respond_with(reply("from model-a"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({ "model": "model-b" })))
        .respond_with(reply("from model-b"))
        .mount(&server)
        .await;

    let cache = Arc::new(RequestCache::new());
    let pool = Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap());
    let build = |model: &str, system_prompt: &str| {
        Vedanta::builder()
            .config(ClientConfig::default())
            .base_url(server.uri())
            .model(model)
            .system_prompt(system_prompt)
            .pool(pool.clone())
            .cache(cache.clone())
            .build()
            .unwrap()
    };
    let a = build("model-a", "Be brief.");
    let b = build("model-b", "Be brief.");
    let a_verbose = build("model-a", "Be thorough.");
    let opts = GenerationOptions::default();

    assert_eq!(a.generate("Hi", &[], &opts).await.unwrap(), "from model-a");
    assert_eq!(b.generate("Hi", &[], &opts).await.unwrap(), "from model-b");
    assert_eq!(request_count(&server).await, 2);

    // A different system prompt is a different conversation.
    assert_eq!(
        a_verbose.generate("Hi", &[], &opts).await.unwrap(),
        "from model-a"
    );
    assert_eq!(request_count(&server).await, 3);

    // Each client still hits its own entry.
    assert_eq!(a.generate("Hi", &[], &opts).await.unwrap(), "from model-a");
    assert_eq!(b.generate("Hi", &[], &opts).await.unwrap(), "from model-b");
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn closing_during_backoff_stops_retrying() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = Vedanta::builder()
        .config(ClientConfig::default())
        .base_url(server.uri())
        .max_retries(3)
        .retry_base_delay(Duration::from_millis(300))
        .pool(Arc::new(ConnectionPool::new(&PoolConfig::new()).unwrap()))
        .cache(Arc::new(RequestCache::new()))
        .build()
        .unwrap();

    let closer = client.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close();
    });

    let start = Instant::now();
    let err = client
        .generate("Hi", &[], &GenerationOptions::default())
        .await
        .unwrap_err();

    assert!(
        start.elapsed() < Duration::from_millis(280),
        "call slept through its backoff: {:?}",
        start.elapsed()
    );
    assert!(matches!(err, VedantaError::PoolClosed), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(request_count(&server).await, 1);
}
