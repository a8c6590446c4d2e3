//! HTTP server assembly: shared state, router, health endpoints.

mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use ripple_realtime::hub::{Hub, HubHandle};

use crate::auth::AuthConfig;
use crate::config::Config;
use crate::contacts::ContactRepository;
use crate::db::Database;
use crate::delivery::DeliveryCoordinator;
use crate::mailbox::MessageMailbox;
use crate::storage::AttachmentSigner;

/// Shared application state.
pub struct AppState {
    pub database: Database,
    pub hub: HubHandle,
    pub mailbox: MessageMailbox,
    pub contacts: ContactRepository,
    pub coordinator: DeliveryCoordinator,
    pub signer: Option<AttachmentSigner>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(config: &Config, database: Database, hub: HubHandle) -> Self {
        let mailbox = MessageMailbox::new(database.pool().clone());
        let contacts = ContactRepository::new(database.pool().clone());
        let coordinator = DeliveryCoordinator::new(mailbox.clone(), hub.clone());
        let signer = config.storage.as_ref().map(AttachmentSigner::new);
        Self {
            database,
            hub,
            mailbox,
            contacts,
            coordinator,
            signer,
            auth: config.auth.clone(),
        }
    }
}

/// Spawn the hub and serve the API until the listener fails.
pub async fn start(config: Config, database: Database) -> Result<()> {
    let hub = Hub::spawn();
    let state = Arc::new(AppState::new(&config, database, hub));
    let app = create_router(state);

    info!("starting HTTP server on {}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(detailed_health_handler))
        .with_state(state.clone())
        .merge(routes::messages::router(state.clone()))
        .merge(routes::websocket::router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    database: &'static str,
}

async fn detailed_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state.database.ping().await.is_ok();
    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(DetailedHealthResponse {
            status: if db_ok { "healthy" } else { "unhealthy" },
            service: "ripple-server",
            version: env!("CARGO_PKG_VERSION"),
            database: if db_ok { "up" } else { "down" },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::auth::issue_token;
    use crate::db::{DatabaseConfig, MigrationRunner};
    use crate::mailbox::Pagination;

    const TEST_SECRET: &str = "test-secret";

    async fn test_state() -> Arc<AppState> {
        let database = Database::in_memory().await.unwrap();
        MigrationRunner::all().run(&database).await.unwrap();
        let config = Config {
            addr: "127.0.0.1:0".parse().unwrap(),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: TEST_SECRET.to_owned(),
            },
            storage: None,
        };
        Arc::new(AppState::new(&config, database, Hub::spawn()))
    }

    fn bearer(user_id: i64) -> String {
        format!("Bearer {}", issue_token(TEST_SECRET, user_id, 3600).unwrap())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn detailed_health_reports_database_up() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["database"], "up");
    }

    #[tokio::test]
    async fn message_routes_require_a_token() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/messages")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_tokens_are_rejected() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/messages")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn send_to_contact_returns_created_and_parks_the_message() {
        let state = test_state().await;
        state.contacts.add(1, 2).await.unwrap();
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/messages/2")
                    .header(header::AUTHORIZATION, bearer(1))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"content":"hi bob"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let message: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(message["content"], "hi bob");
        assert_eq!(message["sender_id"], 1);
        assert_eq!(message["receiver_id"], 2);

        // Receiver is offline, so the message must be parked.
        let (records, total) = state
            .mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].content, "hi bob");
    }

    #[tokio::test]
    async fn send_to_online_contact_pushes_live_and_purges_the_row() {
        let state = test_state().await;
        state.contacts.add(1, 2).await.unwrap();

        // Stand in for the receiver's connection actor.
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        state
            .hub
            .register(uuid::Uuid::new_v4(), 2, tx)
            .await
            .unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ripple_realtime::hub::WELCOME_FRAME
        );

        let app = create_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/messages/2")
                    .header(header::AUTHORIZATION, bearer(1))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"content":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);

        let frame = rx.recv().await.unwrap();
        let event: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(event["type"], "MESSAGE");
        assert_eq!(event["message"]["content"], "hi");

        let (_, total) = state
            .mailbox
            .list_undelivered(2, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn send_to_a_stranger_is_forbidden() {
        let app = create_router(test_state().await);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/messages/2")
                    .header(header::AUTHORIZATION, bearer(1))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"content":"hi stranger"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn oversized_content_is_a_bad_request() {
        let state = test_state().await;
        state.contacts.add(1, 2).await.unwrap();
        let app = create_router(state);

        let body = serde_json::json!({"content": "x".repeat(1001)}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/messages/2")
                    .header(header::AUTHORIZATION, bearer(1))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pull_returns_the_callers_parked_messages() {
        let state = test_state().await;
        state.contacts.add(1, 2).await.unwrap();
        state
            .coordinator
            .send(crate::mailbox::MessageCreate::new(1, 2, "waiting for you"))
            .await
            .unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/messages?page=1&limit=10")
                    .header(header::AUTHORIZATION, bearer(2))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["total_records"], 1);
        assert_eq!(envelope["records"][0]["content"], "waiting for you");
    }

    #[tokio::test]
    async fn pull_for_another_user_is_empty() {
        let state = test_state().await;
        state.contacts.add(1, 2).await.unwrap();
        state
            .coordinator
            .send(crate::mailbox::MessageCreate::new(1, 2, "not for carol"))
            .await
            .unwrap();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/messages")
                    .header(header::AUTHORIZATION, bearer(3))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["total_records"], 0);
        assert_eq!(envelope["records"].as_array().unwrap().len(), 0);
    }
}
