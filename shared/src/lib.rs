//! Shared library for the furniture health detector.
//!
//! This crate holds the detection pipeline (quality gate, vision model client,
//! knowledge base, risk resolution, report assembly) and the clients and
//! helpers the Lambda handlers build around it.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod form;
pub mod http;
pub mod knowledge;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod risk;
pub mod secrets;
pub mod share;
pub mod storage;
pub mod vlm;

pub use cache::ReportCache;
pub use codec::{ImageCodec, JpegCodec};
pub use config::Config;
pub use error::{Error, ExternalService, Result};
pub use http::ApiResponse;
pub use knowledge::{KnowledgeBase, KnowledgeEntry};
pub use models::{
    MaterialObservation, MaterialType, RiskAssessment, RiskLevel, ShareCard, ShareCardRequest,
    TemplateStyle, VisualCue,
};
pub use pipeline::{DetectionPipeline, DetectionRequest};
pub use quality::QualityGate;
pub use report::DetectionReport;
pub use risk::RiskResolver;
pub use storage::{ImageStorage, S3ImageStorage};
pub use vlm::{ParsedResponse, RetryPolicy, VisionModel, VlmClient};
