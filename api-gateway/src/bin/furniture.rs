//! Furniture Detection Lambda - material identification and share cards.
//!
//! Endpoints:
//! - POST /furniture/detect - Upload a furniture photo, get a health-risk report
//! - POST /share/generate - Build a share card for a recent report
//! - GET /health - Catalog size and model status
//!
//! Paths may carry an `/api/v1` prefix.

use std::sync::Arc;
use std::time::Instant;

use furniture_shared::form::parse_detect_form;
use furniture_shared::http::{error_response, from_error, json_response};
use furniture_shared::secrets::resolve_api_key;
use furniture_shared::share::build_share_card;
use furniture_shared::vlm::OpenAiCompatibleModel;
use furniture_shared::{
    ApiResponse, Config, DetectionPipeline, Error as SharedError, JpegCodec, KnowledgeBase,
    QualityGate, ReportCache, RetryPolicy, RiskResolver, S3ImageStorage, ShareCardRequest,
    VlmClient,
};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use validator::Validate;

const API_PREFIX: &str = "/api/v1";

/// Application state
struct AppState {
    pipeline: DetectionPipeline,
    reports: ReportCache,
    knowledge_base: Arc<KnowledgeBase>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let knowledge_base = Arc::new(KnowledgeBase::load(&config.knowledge_base_path)?);
        info!(
            "Loaded {} catalog entries from {}",
            knowledge_base.len(),
            config.knowledge_base_path
        );

        let api_key = resolve_api_key(&sdk_config, &config.vlm.api_key).await?;
        let model =
            OpenAiCompatibleModel::new(&config.vlm.base_url, api_key, config.vlm.timeout)?;
        let vlm = VlmClient::new(
            Arc::new(model),
            config.vlm.model.clone(),
            RetryPolicy {
                max_attempts: config.vlm.max_retries,
                base_delay: config.vlm.retry_delay,
            },
        );

        let pipeline = DetectionPipeline::new(
            QualityGate::new(config.quality),
            Arc::new(JpegCodec::new(
                config.storage.image_quality,
                config.storage.max_dimension,
            )),
            Arc::new(S3ImageStorage::new(&sdk_config, &config.storage)),
            Arc::new(vlm),
            RiskResolver::new(Arc::clone(&knowledge_base)),
        );

        Ok(Self {
            pipeline,
            reports: ReportCache::new(config.report_cache_capacity, config.report_ttl),
            knowledge_base,
        })
    }
}

async fn handle_detect(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    let content_type = event
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());

    let request = match parse_detect_form(content_type, event.body().as_ref()).await {
        Ok(request) => request,
        Err(e) => return from_error(&e),
    };

    match state.pipeline.detect(request).await {
        Ok(report) => {
            let report = state.reports.insert(report).await;
            json_response(200, &ApiResponse::success(report.as_ref()))
        }
        Err(e) => {
            log_detection_failure(&e);
            from_error(&e)
        }
    }
}

/// Client mistakes go to warn so the error log only carries server faults.
fn log_detection_failure(err: &SharedError) {
    if err.is_client_error() {
        warn!("Detection rejected: {}", err);
    } else {
        error!("Detection failed: {}", err);
    }
}

async fn handle_share(state: &AppState, event: &Request) -> Result<Response<Body>, Error> {
    let request: ShareCardRequest = match serde_json::from_slice(event.body().as_ref()) {
        Ok(request) => request,
        Err(_) => return error_response(400, "Invalid request body"),
    };

    if let Err(e) = request.validate() {
        return error_response(400, e.to_string());
    }

    let report_id = match Uuid::parse_str(request.report_id.trim()) {
        Ok(id) => id,
        Err(_) => return error_response(400, "Invalid report ID"),
    };

    let Some(report) = state.reports.get(&report_id).await else {
        warn!("Share requested for unknown report {}", report_id);
        return error_response(404, "报告不存在或已过期");
    };

    let card = build_share_card(state.pipeline.vlm(), &report, request.template_style).await;
    json_response(200, &ApiResponse::success(card))
}

fn handle_health(state: &AppState) -> Result<Response<Body>, Error> {
    json_response(
        200,
        &ApiResponse::success(serde_json::json!({
            "status": "healthy",
            "knowledge_base_entries": state.knowledge_base.len(),
            "model": state.pipeline.vlm().model_name(),
            "model_configured": true,
        })),
    )
}

fn route_path(path: &str) -> &str {
    path.strip_prefix(API_PREFIX)
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(path)
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let started = Instant::now();
    let method = event.method().as_str().to_string();
    let path = event.uri().path().to_string();

    let response = match (method.as_str(), route_path(&path)) {
        ("POST", "/furniture/detect") => handle_detect(&state, &event).await,
        ("POST", "/share/generate") => handle_share(&state, &event).await,
        ("GET", "/health") => handle_health(&state),
        ("OPTIONS", _) => Ok(Response::builder()
            .status(204)
            .header("access-control-allow-origin", "*")
            .header("access-control-allow-methods", "GET, POST, OPTIONS")
            .header("access-control-allow-headers", "*")
            .body(Body::Empty)?),
        _ => error_response(404, "Not found"),
    }?;

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_path_strips_prefix() {
        assert_eq!(route_path("/api/v1/furniture/detect"), "/furniture/detect");
        assert_eq!(route_path("/share/generate"), "/share/generate");
        assert_eq!(route_path("/api/v1"), "/api/v1");
        assert_eq!(route_path("/api/v1x/health"), "/api/v1x/health");
    }
}
