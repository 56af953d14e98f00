//! HTTP surface for the ledger engine
//!
//! Twilio-style webhook in, TwiML out. Every inbound message gets exactly
//! one `<Message>` reply, errors included.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::LedgerEngine;
use crate::models::InboundMessage;

/// =============================
/// Request Models
/// =============================

/// Form fields posted by the messaging provider. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct WebhookForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MediaUrl0")]
    pub media_url: Option<String>,
}

impl From<WebhookForm> for InboundMessage {
    fn from(form: WebhookForm) -> Self {
        let message = InboundMessage::new(form.from, form.body);
        match form.media_url.filter(|url| !url.trim().is_empty()) {
            Some(url) => message.with_media(url),
            None => message,
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<LedgerEngine>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Webhook Endpoint
/// =============================

async fn webhook(State(state): State<ApiState>, Form(form): Form<WebhookForm>) -> impl IntoResponse {
    let message = InboundMessage::from(form);
    let reply = state.engine.handle(message).await;

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml(&reply),
    )
}

fn twiml(reply: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        escape_xml(reply)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<LedgerEngine>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    engine: Arc<LedgerEngine>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Webhook listening on http://0.0.0.0:{}/webhook", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
