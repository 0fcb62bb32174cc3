//! HTTP routing and response helpers

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};

use dispatch_proxy_core::context::AppContext;
use dispatch_proxy_core::dispatch::{self, DispatchRequest};
use dispatch_proxy_core::error::{ApiError, ErrorResponse};

/// Largest accepted dispatch body
const MAX_BODY_BYTES: usize = 64 * 1024;

const OPENAPI_YAML: &str = include_str!("../assets/openapi.yaml");
const OPENAPI_CACHE_CONTROL: &str = "public, max-age=172800";

pub type HyperResponse = Response<Full<Bytes>>;

/// Shared application state
pub struct AppState {
    pub ctx: AppContext,
    pub base_path: String,
    pub openapi_json: Vec<u8>,
}

impl AppState {
    pub fn new(ctx: AppContext, base_path: String) -> anyhow::Result<Self> {
        Ok(Self {
            ctx,
            base_path,
            openapi_json: render_openapi_json()?,
        })
    }
}

/// Render the bundled OpenAPI document as JSON
fn render_openapi_json() -> anyhow::Result<Vec<u8>> {
    let document: serde_json::Value = serde_yaml::from_str(OPENAPI_YAML)?;
    Ok(serde_json::to_vec(&document)?)
}

#[derive(Debug, PartialEq, Eq)]
enum Route {
    Dispatch,
    Health,
    OpenApiYaml,
    OpenApiJson,
    NotFound,
}

/// Match a request against the routes mounted under `base_path`
fn match_route(method: &Method, path: &str, base_path: &str) -> Route {
    let relative = if base_path == "/" {
        Some(path)
    } else {
        path.strip_prefix(base_path)
            .filter(|rest| rest.is_empty() || rest.starts_with('/'))
    };

    match (method, relative) {
        (&Method::POST, Some("/dispatch")) => Route::Dispatch,
        (&Method::GET, Some("/healthz")) => Route::Health,
        (&Method::GET, Some("/openapi.yaml")) => Route::OpenApiYaml,
        (&Method::GET, Some("/openapi.json")) => Route::OpenApiJson,
        _ => Route::NotFound,
    }
}

pub async fn route_request(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    match match_route(req.method(), req.uri().path(), &state.base_path) {
        Route::Dispatch => handle_dispatch(req, state).await,
        Route::Health => json_response(StatusCode::OK, &serde_json::json!({"message": "ok"})),
        Route::OpenApiYaml => document_response(OPENAPI_YAML.as_bytes().to_vec(), "application/yaml"),
        Route::OpenApiJson => document_response(state.openapi_json.clone(), "application/json"),
        Route::NotFound => json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "Not found"})),
    }
}

async fn handle_dispatch(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // An unreadable body parses as invalid once the caller is authenticated
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes().to_vec(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request body");
            Vec::new()
        }
    };

    let request = DispatchRequest { authorization, body };

    match dispatch::handle(request, &state.ctx).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(error = %e, "dispatch request failed");
            } else {
                tracing::warn!(error = %e, "dispatch request rejected");
            }
            error_response(&e)
        }
    }
}

fn error_response(err: &ApiError) -> HyperResponse {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &ErrorResponse::from(err))
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let json = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn document_response(body: Vec<u8>, content_type: &'static str) -> HyperResponse {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(OPENAPI_CACHE_CONTROL));
    response
}
