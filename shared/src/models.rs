//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{Error, Result};

/// Visual features the model reports for a material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualCue {
    pub texture: String,
    pub color: String,
    pub pattern: String,
}

/// The four material families the model must choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    #[serde(rename = "实木类", alias = "SolidWood")]
    SolidWood,
    #[serde(rename = "人造板类", alias = "EngineeredWood", alias = "人造板材")]
    EngineeredWood,
    #[serde(rename = "皮革类", alias = "Leather")]
    Leather,
    #[serde(rename = "布类", alias = "Fabric")]
    Fabric,
}

impl MaterialType {
    /// Label used in prompts, catalogs and responses.
    pub fn label(&self) -> &'static str {
        match self {
            MaterialType::SolidWood => "实木类",
            MaterialType::EngineeredWood => "人造板类",
            MaterialType::Leather => "皮革类",
            MaterialType::Fabric => "布类",
        }
    }

    /// Parse a free-text label from the model. Accepts the Chinese family
    /// names, their common variants, and the English variant names.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "实木类" | "实木" | "SolidWood" | "solid_wood" | "Solid Wood" => {
                Some(MaterialType::SolidWood)
            }
            "人造板类" | "人造板材" | "人造板" | "EngineeredWood" | "engineered_wood"
            | "Engineered Wood" => Some(MaterialType::EngineeredWood),
            "皮革类" | "皮革" | "Leather" | "leather" => Some(MaterialType::Leather),
            "布类" | "布艺" | "Fabric" | "fabric" => Some(MaterialType::Fabric),
            _ => None,
        }
    }
}

impl std::fmt::Display for MaterialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One material the model recognised in the photo.
///
/// Built only through [`MaterialObservation::new`], which keeps the
/// confidence inside `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialObservation {
    material_type: MaterialType,
    sub_type: String,
    confidence: f64,
    visual_cues: VisualCue,
}

impl MaterialObservation {
    /// Build an observation, clamping out-of-range confidence values.
    ///
    /// Non-finite confidence is rejected outright since there is nothing
    /// sensible to clamp it to. Blank sub-types are rejected too.
    pub fn new(
        material_type: MaterialType,
        sub_type: impl Into<String>,
        confidence: f64,
        visual_cues: VisualCue,
    ) -> Result<Self> {
        if !confidence.is_finite() {
            return Err(Error::Validation(format!(
                "confidence must be a finite number, got {}",
                confidence
            )));
        }

        let sub_type = sub_type.into().trim().to_string();
        if sub_type.is_empty() {
            return Err(Error::Validation("sub_type cannot be empty".to_string()));
        }

        Ok(Self {
            material_type,
            sub_type,
            confidence: confidence.clamp(0.0, 100.0),
            visual_cues,
        })
    }

    pub fn material_type(&self) -> MaterialType {
        self.material_type
    }

    /// Free-text label, used only as a join key into the knowledge base.
    pub fn sub_type(&self) -> &str {
        &self.sub_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn visual_cues(&self) -> &VisualCue {
        &self.visual_cues
    }
}

/// Risk bands, labelled the way the catalog labels them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "低风险", alias = "Low")]
    Low,
    #[serde(rename = "中风险", alias = "Medium")]
    Medium,
    #[serde(rename = "高风险", alias = "High")]
    High,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "低风险",
            RiskLevel::Medium => "中风险",
            RiskLevel::High => "高风险",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Health risk profile attached to a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub harmful_substances: Vec<String>,
    #[serde(default)]
    pub sensitive_groups: Vec<String>,
    pub health_impacts: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Visual style of a share card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStyle {
    #[default]
    Modern,
    Classic,
    Minimal,
}

/// Share card request payload.
#[derive(Debug, Deserialize, Validate)]
pub struct ShareCardRequest {
    #[validate(length(min = 1, message = "report_id cannot be empty"))]
    pub report_id: String,
    #[serde(default)]
    pub template_style: TemplateStyle,
}

/// Share card payload handed to the card renderer and the client.
#[derive(Debug, Clone, Serialize)]
pub struct ShareCard {
    pub card_id: Uuid,
    pub report_id: Uuid,
    pub catchphrase: String,
    pub template_style: TemplateStyle,
    pub furniture_type: String,
    pub headline_material: MaterialObservation,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<String>,
    /// Mini-program path the card's QR code points at
    pub report_path: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
