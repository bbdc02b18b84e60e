//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, timeout, send-data)
//! - Intercept uploads on configured routes
//! - Forward everything to the upstream application

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{uri::InvalidUri, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::upstream::Upstream;
use crate::observability::metrics;
use crate::routing::{RouteKind, Router as ProxyRouter};
use crate::send_data::{send_data_middleware, SendDataState};
use crate::storage::ObjectSink;
use crate::upload::{
    ClaimsSigner, DefaultPreparer, Interception, PreAuthorizer, UploadInterceptor,
    REWRITTEN_FIELDS_HEADER,
};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid upstream address: {0}")]
    Upstream(#[from] InvalidUri),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub upstream: Upstream,
    pub uploads: Arc<UploadInterceptor>,
}

/// HTTP server for the accelerating proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build the server. `signer` signs the claims forwarded with uploads.
    pub fn new(config: ProxyConfig, signer: ClaimsSigner) -> Result<Self, ServerError> {
        let upstream = Upstream::new(
            &config.upstream.address,
            Duration::from_secs(config.timeouts.connect_secs),
        )?;

        let uploads = UploadInterceptor::new(
            PreAuthorizer::new(upstream.clone(), config.upstream.authorize_suffix.clone()),
            Arc::new(DefaultPreparer::new(config.uploads.clone())),
            ObjectSink::default(),
            signer,
        );

        let state = AppState {
            router: Arc::new(ProxyRouter::from_config(config.uploads.routes.clone())),
            upstream,
            uploads: Arc::new(uploads),
        };
        let send_data = SendDataState::new(config.send_data.clone());

        let router = Self::build_router(&config, state, send_data);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState, send_data: SendDataState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(send_data, send_data_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            upload_routes = self.config.uploads.routes.len(),
            "HTTP server starting"
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Classifies the request, intercepts uploads, and forwards upstream.
async fn proxy_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Only this proxy may assert rewritten fields.
    request.headers_mut().remove(REWRITTEN_FIELDS_HEADER);

    let route = state.router.classify(&method, &path);
    let route_label = match &route {
        RouteKind::Upload(name) => name.clone(),
        RouteKind::Proxy => "proxy".to_string(),
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        route = %route_label,
        "Proxying request"
    );

    let (request, session) = match route {
        RouteKind::Upload(_) => match state.uploads.intercept(request, &request_id).await {
            Ok(Interception::Forward { request, session }) => (request, Some(session)),
            Ok(Interception::Respond(response)) => {
                metrics::record_request(method.as_str(), response.status().as_u16(), &route_label, start_time);
                return response;
            }
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    tracing::error!(request_id = %request_id, error = %e, "Upload interception failed");
                } else {
                    tracing::info!(request_id = %request_id, error = %e, "Upload rejected");
                }
                metrics::record_request(method.as_str(), status.as_u16(), &route_label, start_time);
                return e.into_response();
            }
        },
        RouteKind::Proxy => (request, None),
    };

    let response = match state.upstream.send(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            metrics::record_request(method.as_str(), 502, &route_label, start_time);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    // Upstream has answered; stored upload objects are no longer needed.
    drop(session);

    metrics::record_request(method.as_str(), response.status().as_u16(), &route_label, start_time);
    response
}
