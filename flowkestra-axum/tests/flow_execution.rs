use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use flowkestra_axum::{ErrorResponse, FlowEngine, FlowkestraAxumExt, FlowkestraState};
use flowkestra_core::{Application, FlowDefinition, StepSpec};
use flowkestra_flow::{CredentialsStep, MemoryFlowStore, StaticCredentials, StaticRegistry};
use flowkestra_providers_google::{GoogleProvider, AUTHORIZATION_ENDPOINT};
use flowkestra_token::TokenManager;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &[u8] = b"axum-test-secret";
const CALLBACK: &str = "https://localhost:8090/flow/callback";

fn engine(google: GoogleProvider) -> FlowEngine {
    let registry = StaticRegistry::new()
        .with_flow(FlowDefinition::new(
            "google-login",
            vec![StepSpec::new("google")],
        ))
        .with_flow(FlowDefinition::new("basic-login", vec![StepSpec::new("basic")]))
        .with_application(Application::new("test-google-app-id", "google-login"))
        .with_application(Application::new("test-basic-app-id", "basic-login"));

    FlowEngine::builder()
        .provider(google)
        .provider(CredentialsStep::new(
            StaticCredentials::new()
                .with_user("alice", "wonderland")
                .unwrap(),
        ))
        .registry(Arc::new(registry))
        .store(Arc::new(MemoryFlowStore::new()))
        .token_manager(Arc::new(TokenManager::new(SECRET)))
        .build()
}

fn app(engine: FlowEngine) -> Router {
    engine
        .axum_router()
        .with_state(FlowkestraState::from(engine))
}

fn google() -> GoogleProvider {
    GoogleProvider::new("test-client-id".into(), "test-secret".into(), CALLBACK.into())
}

async fn execute(app: &Router, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/flow/execute")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn query(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .into_owned()
        .collect()
}

#[tokio::test]
async fn google_initiation_returns_a_complete_redirect() {
    let app = app(engine(google()));
    let (status, body) = execute(
        &app,
        json!({ "applicationId": "test-google-app-id", "flowType": "AUTHENTICATION" })
            .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flowStatus"], "INCOMPLETE");
    assert_eq!(body["type"], "REDIRECTION");
    assert!(!body["flowId"].as_str().unwrap().is_empty());

    let redirect = body["data"]["redirectURL"].as_str().unwrap();
    let params = query(redirect);
    assert_eq!(params["client_id"], "test-client-id");
    assert_eq!(params["redirect_uri"], CALLBACK);
    assert_eq!(params["response_type"], "code");
    for scope in ["openid", "email", "profile"] {
        assert!(params["scope"].contains(scope), "scope lacks {scope}");
    }
}

#[tokio::test]
async fn invalid_app_id_is_reported_as_fes_1003() {
    let app = app(engine(google()));
    let (status, body) = execute(
        &app,
        json!({ "applicationId": "invalid-google-app-id", "flowType": "AUTHENTICATION" })
            .to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let err: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(err.code, "FES-1003");
    assert_eq!(err.message, "Invalid request");
    assert_eq!(err.description, "Invalid app ID provided in the request");
}

#[tokio::test]
async fn invalid_app_id_wins_over_invalid_flow_type() {
    let app = app(engine(google()));
    let (_, body) = execute(
        &app,
        json!({ "applicationId": "nope", "flowType": "REGISTRATION" }).to_string(),
    )
    .await;
    assert_eq!(body["code"], "FES-1003");

    let (status, body) = execute(
        &app,
        json!({ "applicationId": "test-google-app-id", "flowType": "REGISTRATION" })
            .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FES-1007");
}

#[tokio::test]
async fn malformed_body_is_fes_1001() {
    let app = app(engine(google()));
    let (status, body) = execute(&app, "{ not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FES-1001");
    assert_eq!(body["description"], "Invalid request payload");
}

#[tokio::test]
async fn unknown_flow_id_is_fes_1002() {
    let app = app(engine(google()));
    let (status, body) = execute(
        &app,
        json!({ "flowId": "00000000-0000-4000-8000-000000000000", "inputs": {} }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FES-1002");
}

#[tokio::test]
async fn credentials_flow_completes_over_http() {
    let app = app(engine(google()));
    let (_, started) = execute(
        &app,
        json!({ "applicationId": "test-basic-app-id" }).to_string(),
    )
    .await;
    assert_eq!(started["type"], "VIEW");
    let flow_id = started["flowId"].as_str().unwrap().to_string();

    let (status, done) = execute(
        &app,
        json!({
            "flowId": flow_id,
            "inputs": { "username": "alice", "password": "wonderland" }
        })
        .to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["flowStatus"], "COMPLETE");
    let claims = TokenManager::new(SECRET)
        .validate_assertion(done["assertion"].as_str().unwrap(), "test-basic-app-id")
        .unwrap();
    assert_eq!(claims.sub, "alice");

    let (status, again) = execute(
        &app,
        json!({ "flowId": flow_id, "inputs": { "username": "alice" } }).to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(again["code"], "FES-1004");
}

#[tokio::test]
async fn google_callback_completes_the_flow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "110169484474386276334",
            "email": "jsmith@example.com",
            "email_verified": true
        })))
        .mount(&server)
        .await;

    let provider = google().with_endpoints(
        AUTHORIZATION_ENDPOINT,
        format!("{}/token", server.uri()),
        format!("{}/userinfo", server.uri()),
    );
    let app = app(engine(provider));

    let (_, started) = execute(
        &app,
        json!({ "applicationId": "test-google-app-id" }).to_string(),
    )
    .await;
    let params = query(started["data"]["redirectURL"].as_str().unwrap());
    let state = url::form_urlencoded::byte_serialize(params["state"].as_bytes()).collect::<String>();

    let request = Request::builder()
        .uri(format!("/flow/callback?code=auth-code&state={state}"))
        .body(Body::empty())
        .unwrap();
    let (status, done) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["flowStatus"], "COMPLETE");
    assert_eq!(done["flowId"], started["flowId"]);
    let claims = TokenManager::new(SECRET)
        .validate_assertion(done["assertion"].as_str().unwrap(), "test-google-app-id")
        .unwrap();
    assert_eq!(claims.sub, "110169484474386276334");
    assert_eq!(claims.idp, "google");
}

#[tokio::test]
async fn callback_without_state_is_fes_1001() {
    let app = app(engine(google()));
    let request = Request::builder()
        .uri("/flow/callback?code=abc")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FES-1001");
}

#[tokio::test]
async fn denied_consent_callback_ends_the_flow() {
    let app = app(engine(google()));
    let (_, started) = execute(
        &app,
        json!({ "applicationId": "test-google-app-id" }).to_string(),
    )
    .await;
    let params = query(started["data"]["redirectURL"].as_str().unwrap());
    let state = url::form_urlencoded::byte_serialize(params["state"].as_bytes()).collect::<String>();
    let flow_id = started["flowId"].as_str().unwrap();

    let forged = Request::builder()
        .uri(format!("/flow/callback?error=access_denied&state={flow_id}.attacker"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FES-1005");

    let denied = Request::builder()
        .uri(format!("/flow/callback?error=access_denied&state={state}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, denied).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["flowStatus"], "ERROR");
    assert_eq!(body["failureReason"], "Google returned access_denied");
    assert!(body.get("type").is_none() || body["type"].is_null());
}
