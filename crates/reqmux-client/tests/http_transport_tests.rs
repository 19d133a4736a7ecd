//! End-to-end tests for the HTTP transport against an in-process endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use reqmux_client::{
    CallbackFns, FetchError, HttpTransport, Multiplexer, RequestSpec, Submission, Transport,
    TransportError,
};
use reqmux_domain::{InboundEnvelope, OutboundEnvelope, WireRequest, WireResponse};
use serde_json::{json, Value};

/// Answers every request with `{route, data}`, or an error for route "fail".
async fn echo_batch(Json(envelope): Json<OutboundEnvelope>) -> Json<InboundEnvelope> {
    let responses = envelope
        .requests
        .iter()
        .map(|request| {
            if request.route == "fail" {
                WireResponse::error(json!({"message": "denied"}))
            } else {
                WireResponse::success(json!({"route": request.route, "data": request.data}))
            }
        })
        .collect();
    Json(InboundEnvelope::new(envelope.rank, responses))
}

async fn spawn_server(router: Router) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Ok(addr)
}

fn transport(addr: SocketAddr) -> anyhow::Result<HttpTransport> {
    Ok(HttpTransport::new(
        format!("http://{addr}/batch"),
        Duration::from_secs(5),
    )?)
}

fn envelope(routes: &[&str]) -> OutboundEnvelope {
    OutboundEnvelope {
        rank: 1,
        requests: routes
            .iter()
            .map(|route| WireRequest {
                route: route.to_string(),
                data: json!({}),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_http_transport_round_trip() -> anyhow::Result<()> {
    let addr = spawn_server(Router::new().route("/batch", post(echo_batch))).await?;
    let transport = transport(addr)?;

    let inbound = transport.send(&envelope(&["getUsers", "fail"])).await?;

    assert_eq!(inbound.effective_rank(), Some(1));
    assert_eq!(inbound.responses.len(), 2);
    assert_eq!(
        inbound.responses[0].outcome(),
        Ok(&json!({"route": "getUsers", "data": {}}))
    );
    assert_eq!(
        inbound.responses[1].outcome(),
        Err(FetchError::Remote(json!({"message": "denied"})))
    );
    Ok(())
}

#[tokio::test]
async fn test_http_transport_rejects_error_status() -> anyhow::Result<()> {
    let router = Router::new().route(
        "/batch",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let addr = spawn_server(router).await?;

    let result = transport(addr)?.send(&envelope(&["getUsers"])).await;

    assert!(matches!(result, Err(TransportError::Status { status: 503 })));
    Ok(())
}

#[tokio::test]
async fn test_http_transport_rejects_non_envelope_body() -> anyhow::Result<()> {
    let router = Router::new().route("/batch", post(|| async { "<html>oops</html>" }));
    let addr = spawn_server(router).await?;

    let result = transport(addr)?.send(&envelope(&["getUsers"])).await;

    assert!(matches!(result, Err(TransportError::Decode { .. })));
    Ok(())
}

#[tokio::test]
async fn test_multiplexer_over_http_coalesces_into_one_post() -> anyhow::Result<()> {
    let posts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&posts);
    let router = Router::new().route(
        "/batch",
        post(move |body: Json<OutboundEnvelope>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                echo_batch(body).await
            }
        }),
    );
    let addr = spawn_server(router).await?;

    let mux = Multiplexer::builder()
        .endpoint(format!("http://{addr}/batch"))
        .batch_size(10)
        .min_delay(Duration::from_millis(10))
        .max_delay(Duration::from_millis(50))
        .build()?;

    let results: Arc<Mutex<Vec<Result<Value, FetchError>>>> = Arc::default();
    let submissions = ["getUsers", "getUsers", "getGroups", "fail"]
        .iter()
        .map(|route| {
            let ok = Arc::clone(&results);
            let err = Arc::clone(&results);
            let callbacks = CallbackFns::new()
                .on_success(move |payload| ok.lock().unwrap().push(Ok(payload.clone())))
                .on_error(move |error| err.lock().unwrap().push(Err(error.clone())))
                .into_arc();
            Submission::new(RequestSpec::new(*route), callbacks)
        })
        .collect();

    mux.submit(submissions).await;
    mux.flush().await;

    assert_eq!(posts.load(Ordering::SeqCst), 1);
    let results = results.lock().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_multiplexer_reports_unreachable_endpoint() -> anyhow::Result<()> {
    // bind then drop so the port is closed
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mux = Multiplexer::builder()
        .endpoint(format!("http://{addr}/batch"))
        .build()?;

    let errors: Arc<Mutex<Vec<FetchError>>> = Arc::default();
    let sink = Arc::clone(&errors);
    let callbacks = CallbackFns::new()
        .on_error(move |error| sink.lock().unwrap().push(error.clone()))
        .into_arc();

    mux.submit_one(RequestSpec::new("getUsers"), callbacks).await;
    mux.flush().await;

    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], FetchError::TransportFailure { .. }));
    Ok(())
}

#[tokio::test]
async fn test_untyped_entry_fails_only_its_request() -> anyhow::Result<()> {
    let router = Router::new().route(
        "/batch",
        post(|| async {
            Json(json!({
                "rank": 1,
                "responses": [{"payload": "no type"}, {"type": "success", "payload": "fine"}]
            }))
        }),
    );
    let addr = spawn_server(router).await?;
    let transport = transport(addr)?;
    assert_eq!(transport.endpoint(), format!("http://{addr}/batch"));

    let mux = Multiplexer::builder()
        .transport(Arc::new(transport))
        .batch_size(10)
        .build()?;

    let results: Arc<Mutex<Vec<(String, Result<Value, FetchError>)>>> = Arc::default();
    let submissions = ["getUsers", "getGroups"]
        .iter()
        .map(|route| {
            let ok = Arc::clone(&results);
            let err = Arc::clone(&results);
            let ok_route = route.to_string();
            let err_route = route.to_string();
            let callbacks = CallbackFns::new()
                .on_success(move |payload| {
                    ok.lock().unwrap().push((ok_route.clone(), Ok(payload.clone())))
                })
                .on_error(move |error| {
                    err.lock().unwrap().push((err_route.clone(), Err(error.clone())))
                })
                .into_arc();
            Submission::new(RequestSpec::new(*route), callbacks)
        })
        .collect();

    mux.submit(submissions).await;
    mux.flush().await;

    let mut results = results.lock().unwrap().clone();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        results,
        vec![
            ("getGroups".to_string(), Ok(json!("fine"))),
            (
                "getUsers".to_string(),
                Err(FetchError::UnknownResponseType {
                    response_type: "<missing>".to_string()
                })
            ),
        ]
    );
    Ok(())
}
