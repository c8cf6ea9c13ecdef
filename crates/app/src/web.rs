//! HTTP routes, request parsing and error rendering.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_SECURITY_POLICY, CONTENT_TYPE, HOST, LOCATION, X_FRAME_OPTIONS};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use k8s_openapi::api::core::v1::ConfigMap;
use mast_api::{ErrorBody, MastApi};
use mast_core::{make_safe_name, ApplicationConfiguration, DeployStatus, MastError, Release, ReleaseMetadata, Tags};
use mast_generate::ApplicationManifest;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::Value;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{error, warn};

use crate::view::StatusPage;

/// Pages may only pull assets from here and cdnjs.
const CONTENT_SECURITY: &str = "default-src 'self' cdnjs.cloudflare.com; \
script-src 'self' cdnjs.cloudflare.com; \
style-src 'self' cdnjs.cloudflare.com; \
font-src 'self' cdnjs.cloudflare.com data:; \
object-src 'none'";

#[derive(Clone)]
pub struct AppState {
    api: Arc<dyn MastApi>,
    scheme: String,
    metrics: Option<PrometheusHandle>,
    page: Arc<StatusPage>,
}

impl AppState {
    pub fn new(api: Arc<dyn MastApi>, scheme: &str, metrics: Option<PrometheusHandle>) -> tera::Result<Self> {
        let page = Arc::new(StatusPage::new()?);
        Ok(Self { api, scheme: scheme.to_string(), metrics, page })
    }

    fn external_url(&self, headers: &HeaderMap, path: &str) -> String {
        let host = headers.get(HOST).and_then(|h| h.to_str().ok()).unwrap_or("localhost");
        format!("{}://{}{}", self.scheme, host, path)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/deploy/", post(deploy).put(deploy))
        .route("/status/{namespace}/{application}/{deployment_id}/", get(status))
        .route("/status/view/{namespace}/{application}/{deployment_id}/", get(status_view))
        .route("/generate/application", post(generate_application))
        .route("/generate/paasbeta_application", post(generate_application))
        .route("/generate/configmap", post(generate_configmap))
        .route("/_/metrics", get(metrics_page))
        .fallback(not_found)
        .layer(SetResponseHeaderLayer::overriding(X_FRAME_OPTIONS, HeaderValue::from_static("DENY")))
        .layer(SetResponseHeaderLayer::overriding(CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY)))
        .with_state(state)
}

// ---- errors ----

#[derive(Debug)]
pub struct WebError(ErrorBody);

impl WebError {
    fn new(code: u16, description: impl Into<Value>) -> Self {
        Self(ErrorBody::new(code, description))
    }
}

impl From<MastError> for WebError {
    fn from(e: MastError) -> Self {
        if e.is_client_error() {
            warn!(error = %e, "web: rejected request");
        } else {
            error!(error = %e, "web: request failed");
        }
        Self(ErrorBody::from_error(&e))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.0.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self.0)).into_response()
    }
}

type WebResult<T> = Result<T, WebError>;

// ---- request parsing ----

/// Records `web_request_latency` for `page` when dropped.
struct Timer {
    page: &'static str,
    t0: Instant,
}

impl Timer {
    fn start(page: &'static str) -> Self {
        Self { page, t0: Instant::now() }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        metrics::histogram!("web_request_latency", "page" => self.page).record(self.t0.elapsed().as_secs_f64());
    }
}

/// Bodies are JSON whatever the content type says.
fn parse_body(body: &Bytes, required: &[&str]) -> WebResult<Tags> {
    let data = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(WebError::new(400, "Failed to decode JSON object: expected an object")),
        Err(e) => return Err(WebError::new(400, format!("Failed to decode JSON object: {}", e))),
    };
    let missing: Vec<Value> = required
        .iter()
        .filter(|k| !data.contains_key(**k))
        .map(|k| Value::String(format!("Missing key '{}' in input", k)))
        .collect();
    if !missing.is_empty() {
        return Err(WebError::new(422, missing));
    }
    Ok(data)
}

fn string_field(data: &Tags, key: &str) -> WebResult<String> {
    match data.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(MastError::InvalidRequest(format!("Invalid value for '{}' in input, expected a string", key)).into()),
    }
}

fn map_field(data: &Tags, key: &str) -> WebResult<Tags> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(Tags::new()),
        Some(Value::Object(m)) => Ok(m.clone()),
        Some(_) => Err(MastError::InvalidRequest(format!("Invalid value for '{}' in input, expected a mapping", key)).into()),
    }
}

fn release_metadata(data: &Tags) -> WebResult<ReleaseMetadata> {
    let mut meta = ReleaseMetadata::new(&string_field(data, "application_name")?);
    meta.spinnaker_tags = map_field(data, "spinnaker_tags")?;
    meta.raw_tags = map_field(data, "raw_tags")?;
    meta.raw_labels = map_field(data, "raw_labels")?;
    meta.metadata_annotations = map_field(data, "metadata_annotations")?;
    Ok(meta)
}

const RELEASE_FIELDS: [&str; 4] = ["application_name", "config_url", "image", "namespace"];

fn release_from(data: &Tags) -> WebResult<Release> {
    Ok(Release {
        image: string_field(data, "image")?,
        config_url: string_field(data, "config_url")?,
        metadata: release_metadata(data)?,
    })
}

fn status_path(namespace: &str, application: &str, deployment_id: &str) -> String {
    format!("/status/{}/{}/{}/", namespace, application, deployment_id)
}

fn status_view_path(namespace: &str, application: &str, deployment_id: &str) -> String {
    format!("/status/view/{}/{}/{}/", namespace, application, deployment_id)
}

// ---- handlers ----

#[derive(Serialize)]
struct StatusLink {
    status: DeployStatus,
    info: String,
    deployment_status_url: String,
}

#[derive(Serialize)]
struct Generated<M> {
    manifest: M,
    deployment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_url: Option<String>,
}

async fn health() -> Json<&'static str> {
    let _t = Timer::start("health");
    Json("ok")
}

async fn deploy(State(st): State<AppState>, headers: HeaderMap, body: Bytes) -> WebResult<Response> {
    let _t = Timer::start("deploy");
    let data = parse_body(&body, &RELEASE_FIELDS)?;
    let namespace = string_field(&data, "namespace")?;
    let release = release_from(&data)?;
    let deployed = match st.api.deploy(&namespace, release).await {
        Ok(d) => d,
        Err(e) => {
            metrics::counter!("web_deploy_total", "outcome" => "error").increment(1);
            return Err(e.into());
        }
    };
    metrics::counter!("web_deploy_total", "outcome" => "ok").increment(1);
    let status = st.api.status(&deployed.namespace, &deployed.application_name, &deployed.deployment_id).await;
    let location = st.external_url(
        &headers,
        &status_path(&deployed.namespace, &deployed.application_name, &deployed.deployment_id),
    );
    let mut resp = (StatusCode::CREATED, Json(status)).into_response();
    if let Ok(v) = HeaderValue::from_str(&location) {
        resp.headers_mut().insert(LOCATION, v);
    }
    Ok(resp)
}

async fn status(
    State(st): State<AppState>,
    headers: HeaderMap,
    Path((namespace, application, deployment_id)): Path<(String, String, String)>,
) -> Json<StatusLink> {
    let _t = Timer::start("status");
    let s = st.api.status(&namespace, &application, &deployment_id).await;
    let view = st.external_url(&headers, &status_view_path(&namespace, &application, &deployment_id));
    Json(StatusLink {
        status: s.status,
        info: format!("For additional deployment information go to: {}", view),
        deployment_status_url: view,
    })
}

async fn status_view(
    State(st): State<AppState>,
    Path((namespace, application, deployment_id)): Path<(String, String, String)>,
) -> WebResult<Html<String>> {
    let _t = Timer::start("status");
    let s = st.api.status(&namespace, &application, &deployment_id).await;
    let html = st
        .page
        .render(&namespace, &application, &deployment_id, &s)
        .map_err(|e| MastError::Internal(format!("rendering status page: {}", e)))?;
    Ok(Html(html))
}

async fn generate_application(
    State(st): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<Generated<ApplicationManifest>>> {
    let _t = Timer::start("generate_paasbetaapplication");
    let data = parse_body(&body, &RELEASE_FIELDS)?;
    let namespace = string_field(&data, "namespace")?;
    let release = release_from(&data)?;
    let application = make_safe_name(&release.metadata.original_application_name);
    let (deployment_id, manifest) = st.api.generate_application(&namespace, release).await?;
    let status_url = st.external_url(&headers, &status_path(&namespace, &application, &deployment_id));
    Ok(Json(Generated { manifest, deployment_id, status_url: Some(status_url) }))
}

async fn generate_configmap(State(st): State<AppState>, body: Bytes) -> WebResult<Json<Generated<ConfigMap>>> {
    let _t = Timer::start("generate_configmap");
    let data = parse_body(&body, &["application_name", "application_data_url", "namespace"])?;
    let namespace = string_field(&data, "namespace")?;
    let request = ApplicationConfiguration {
        application_data_url: string_field(&data, "application_data_url")?,
        metadata: release_metadata(&data)?,
    };
    let (deployment_id, manifest) = st.api.generate_configmap(&namespace, request).await?;
    Ok(Json(Generated { manifest, deployment_id, status_url: None }))
}

async fn metrics_page(State(st): State<AppState>) -> Response {
    let _t = Timer::start("metrics");
    let body = st.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")], body).into_response()
}

async fn not_found() -> WebError {
    WebError::new(
        404,
        "The requested URL was not found on the server. If you entered the URL manually please check your spelling and try again.",
    )
}
