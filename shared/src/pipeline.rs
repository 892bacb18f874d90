//! The furniture detection pipeline.
//!
//! quality gate -> compress -> upload -> model analysis -> risk resolution
//! -> report assembly. Each stage returns a typed error; nothing is caught
//! and re-labelled further up.

use std::sync::Arc;

use tracing::{info, warn};

use crate::codec::ImageCodec;
use crate::quality::QualityGate;
use crate::report::DetectionReport;
use crate::risk::RiskResolver;
use crate::storage::ImageStorage;
use crate::vlm::{ParsedResponse, VlmClient};
use crate::{Error, Result};

const NO_MATERIALS: &str = "无法识别图片中的材料，请上传更清晰的家具图片";
const UNDECODABLE: &str = "图片无法解码，文件可能已损坏，请重新上传";

/// One inbound detection request.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub image: Vec<u8>,
    pub file_name: Option<String>,
    pub disclaimer_accepted: bool,
}

/// Owns every component a detection needs. Built once at startup.
pub struct DetectionPipeline {
    gate: QualityGate,
    codec: Arc<dyn ImageCodec>,
    storage: Arc<dyn ImageStorage>,
    vlm: Arc<VlmClient>,
    resolver: RiskResolver,
}

impl DetectionPipeline {
    pub fn new(
        gate: QualityGate,
        codec: Arc<dyn ImageCodec>,
        storage: Arc<dyn ImageStorage>,
        vlm: Arc<VlmClient>,
        resolver: RiskResolver,
    ) -> Self {
        Self {
            gate,
            codec,
            storage,
            vlm,
            resolver,
        }
    }

    pub fn vlm(&self) -> &VlmClient {
        &self.vlm
    }

    /// Run a full detection.
    ///
    /// Disclaimer and image checks happen before anything is uploaded or
    /// any model call is made.
    pub async fn detect(&self, request: DetectionRequest) -> Result<DetectionReport> {
        if !request.disclaimer_accepted {
            return Err(Error::Validation("请先接受免责声明".to_string()));
        }

        let info = self.gate.validate(&request.image)?;
        info!(
            "Processing {} ({}x{})",
            request.file_name.as_deref().unwrap_or("unnamed image"),
            info.width,
            info.height
        );

        let codec = Arc::clone(&self.codec);
        let image = request.image;
        let compressed = tokio::task::spawn_blocking(move || codec.compress(&image))
            .await
            .map_err(|e| Error::Internal(format!("Compression task failed: {}", e)))?
            .map_err(|e| match e {
                // The gate only reads headers; a truncated body shows up here.
                Error::Image(err) => {
                    warn!("Upload passed the gate but failed to decode: {}", err);
                    Error::Validation(UNDECODABLE.to_string())
                }
                other => other,
            })?;

        let file_name = request.file_name.as_deref().unwrap_or("furniture.jpg");
        let image_url = self
            .storage
            .upload(compressed, file_name, "image/jpeg")
            .await?;

        let analysis = match self.vlm.analyze(&image_url, None).await? {
            ParsedResponse::Structured(analysis) => analysis,
            ParsedResponse::Unstructured(raw) => {
                warn!("Model gave no structured answer: {}", raw);
                return Err(Error::Validation(NO_MATERIALS.to_string()));
            }
            ParsedResponse::Malformed { raw, error } => {
                warn!("Model answer malformed ({}): {}", error, raw);
                return Err(Error::Validation(NO_MATERIALS.to_string()));
            }
        };

        let risk_assessment = self.resolver.resolve_all(&analysis.materials);
        let report = DetectionReport::build(
            analysis.furniture_type,
            image_url,
            analysis.materials,
            risk_assessment,
            request.disclaimer_accepted,
        )?;

        info!(
            "Detection complete: report {} ({} materials, {})",
            report.report_id(),
            report.materials().len(),
            report.risk_assessment().risk_level
        );
        Ok(report)
    }
}
