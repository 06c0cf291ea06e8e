//! HTTP control API
//!
//! Exposes the lifecycle manager over HTTP with zero business logic of its
//! own — every operation delegates to [`ModelManager`].
//!
//! ## Endpoints
//!
//! - `POST   /api/models`             - Create a new model backend
//! - `GET    /api/models`             - List all model backends
//! - `GET    /api/models/{id}`        - Get a specific model backend
//! - `GET    /api/models/{id}/health` - Re-check a backend's health
//! - `GET    /api/models/{id}/logs`   - Tail the backend container's logs
//! - `DELETE /api/models/{id}`        - Delete a model backend
//! - `GET    /health`                 - Liveness of the control plane itself

use http::{Method, StatusCode};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{ForgeError, Result};
use crate::manager::ModelManager;
use crate::registry::CreateRequest;

/// Default number of log lines returned when the query omits `lines`
const DEFAULT_LOG_LINES: usize = 100;

/// Error payload returned for every failed request
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    error: String,
}

/// HTTP server for the control API
///
/// # Examples
///
/// ```rust,no_run
/// use modelforge::{ControlApiServer, ModelManager};
/// use std::sync::Arc;
/// use tokio::sync::oneshot;
///
/// # async fn example(manager: Arc<ModelManager>) -> modelforge::Result<()> {
/// let (shutdown_tx, shutdown_rx) = oneshot::channel();
/// let server = ControlApiServer::new(manager, "127.0.0.1:8080".parse().unwrap());
/// # let _ = shutdown_tx;
/// server.serve(shutdown_rx).await?;
/// # Ok(())
/// # }
/// ```
pub struct ControlApiServer {
    manager: Arc<ModelManager>,
    bind_addr: SocketAddr,
}

impl ControlApiServer {
    /// Creates a server that delegates to the given manager
    pub fn new(manager: Arc<ModelManager>, bind_addr: SocketAddr) -> Self {
        Self { manager, bind_addr }
    }

    /// Binds and serves until the shutdown signal fires
    ///
    /// Shutdown is graceful: in-flight connections drain before the future
    /// resolves.
    pub async fn serve(self, shutdown: oneshot::Receiver<()>) -> Result<()> {
        let manager = self.manager;
        let make_svc = make_service_fn(move |_conn| {
            let manager = Arc::clone(&manager);
            async move {
                Ok::<_, Infallible>(service_fn(move |request| {
                    handle_request(Arc::clone(&manager), request)
                }))
            }
        });

        let server = Server::try_bind(&self.bind_addr)
            .map_err(|e| {
                ForgeError::configuration(format!(
                    "failed to bind control API to {}: {}",
                    self.bind_addr, e
                ))
            })?
            .serve(make_svc);

        info!(addr = %self.bind_addr, "control API listening");

        server
            .with_graceful_shutdown(async {
                let _ = shutdown.await;
            })
            .await
            .map_err(|e| ForgeError::internal("control API server failed", Some(Box::new(e))))
    }
}

/// Top-level request handler: routes, delegates, renders errors
async fn handle_request(
    manager: Arc<ModelManager>,
    request: Request<Body>,
) -> std::result::Result<Response<Body>, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    debug!(method = %method, path = %path, "control API request");

    let response = match route(manager, request).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    };

    Ok(response)
}

/// Dispatches a request to the matching manager operation
async fn route(manager: Arc<ModelManager>, request: Request<Body>) -> Result<Response<Body>> {
    let method = request.method().clone();
    let path = request.uri().path().trim_matches('/').to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, ["health"]) => {
            json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))
        }

        (&Method::POST, ["api", "models"]) => {
            let body = hyper::body::to_bytes(request.into_body())
                .await
                .map_err(|e| ForgeError::validation(format!("failed to read request body: {}", e)))?;
            let create: CreateRequest = serde_json::from_slice(&body)
                .map_err(|e| ForgeError::validation(format!("invalid request body: {}", e)))?;

            info!(model = %create.model_name, "POST /api/models");
            let record = manager.create_backend(create).await?;

            let mut response = json_response(StatusCode::CREATED, &record)?;
            if let Ok(location) = format!("/api/models/{}", record.id).parse() {
                response
                    .headers_mut()
                    .insert(http::header::LOCATION, location);
            }
            Ok(response)
        }

        (&Method::GET, ["api", "models"]) => {
            let records = manager.list_backends().await;
            json_response(StatusCode::OK, &records)
        }

        (&Method::GET, ["api", "models", id]) => {
            let record = manager.get_backend(id).await?;
            json_response(StatusCode::OK, &record)
        }

        (&Method::GET, ["api", "models", id, "health"]) => {
            let health = manager.check_health(id).await?;
            json_response(StatusCode::OK, &serde_json::json!({ "health": health }))
        }

        (&Method::GET, ["api", "models", id, "logs"]) => {
            let lines = parse_lines_param(request.uri().query());
            let logs = manager.backend_logs(id, lines).await?;
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Body::from(logs))
                .map_err(|e| ForgeError::internal("failed to build response", Some(Box::new(e))))?)
        }

        (&Method::DELETE, ["api", "models", id]) => {
            info!(id = %id, "DELETE /api/models");
            manager.delete_backend(id).await?;
            Ok(Response::builder()
                .status(StatusCode::NO_CONTENT)
                .body(Body::empty())
                .map_err(|e| ForgeError::internal("failed to build response", Some(Box::new(e))))?)
        }

        _ => {
            let payload = ErrorResponse {
                status: 404,
                error: format!("no route for {} /{}", method, path),
            };
            json_response(StatusCode::NOT_FOUND, &payload)
        }
    }
}

/// Extracts `lines=N` from a query string, falling back to the default
fn parse_lines_param(query: Option<&str>) -> usize {
    query
        .unwrap_or("")
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "lines")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(DEFAULT_LOG_LINES)
}

/// Serializes a value as a JSON response with the given status
fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<Body>> {
    let body = serde_json::to_vec(value)
        .map_err(|e| ForgeError::internal("failed to serialize response", Some(Box::new(e))))?;
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(|e| ForgeError::internal("failed to build response", Some(Box::new(e))))
}

/// Renders a [`ForgeError`] as its mapped HTTP status with a JSON body
fn error_response(error: &ForgeError) -> Response<Body> {
    let status = error.to_http_status();
    if status >= 500 {
        warn!(status, error = %error, "control API request failed");
    } else {
        debug!(status, error = %error, "control API request rejected");
    }

    let payload = ErrorResponse {
        status,
        error: error.to_string(),
    };
    let body = serde_json::to_vec(&payload).unwrap_or_else(|_| b"{}".to_vec());

    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}
