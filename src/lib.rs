//! Gatehouse is a lightweight account authentication service: registration,
//! credential login, email verification and password reset.

#[forbid(unsafe_code)]
#[deny(missing_docs, unused_mut)]
mod crypto;
mod auth;
mod database;
pub mod error;
mod mail;
mod router;
mod session;
pub mod telemetry;
mod user;

pub mod config;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, header};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");

    if let Some(token) = token {
        builder = builder
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(builder.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub authenticator: Arc<dyn auth::Authenticator>,
    pub sessions: session::SessionManager,
    pub mail: mail::MailManager,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /create` goes to registration.
        .route("/create", post(router::create::handler))
        // `POST /login` establishes a session, `POST /logout` destroys it.
        .route("/login", post(router::login::handler))
        .route("/logout", post(router::login::logout))
        // Email verification: issue link, then confirm it.
        .route("/verify/send", post(router::verify::send))
        .route("/verify", get(router::verify::confirm))
        // Password reset: request a token, then consume it.
        .route("/password/forgot", post(router::reset::forgot))
        .route("/password/reset", post(router::reset::reset))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let config = config::Configuration::default().read()?;

    let db = match config.postgres {
        Some(ref config) => database::Database::postgres(config).await?,
        None => {
            // Anything stored here is gone on restart.
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, falling \
                 back to the in-memory store"
            );
            database::Database::in_memory()
        },
    };

    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone())?);
    let authenticator = Arc::new(auth::PasswordAuthenticator::new(
        Arc::clone(&db.users),
        Arc::clone(&crypto),
    ));

    // handle mail sender.
    let mail = if let Some(cfg) = &config.mail {
        mail::MailManager::new(cfg)?
    } else {
        mail::MailManager::default()
    };

    Ok(AppState {
        config,
        db,
        crypto,
        authenticator,
        sessions: session::SessionManager::default(),
        mail,
    })
}
