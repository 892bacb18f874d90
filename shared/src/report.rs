//! Detection report assembly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{MaterialObservation, RiskAssessment};
use crate::{Error, Result};

/// Final output of one detection request. Immutable once built.
///
/// The share-card renderer reads the same fields, so the serialized shape is
/// part of the public contract.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    report_id: Uuid,
    timestamp: DateTime<Utc>,
    image_url: String,
    furniture_type: String,
    materials: Vec<MaterialObservation>,
    risk_assessment: RiskAssessment,
    disclaimer_accepted: bool,
}

impl DetectionReport {
    /// Assemble a report with a fresh id and the current time.
    ///
    /// A report with no materials is a failed detection, never an empty
    /// success.
    pub fn build(
        furniture_type: impl Into<String>,
        image_url: impl Into<String>,
        materials: Vec<MaterialObservation>,
        risk_assessment: RiskAssessment,
        disclaimer_accepted: bool,
    ) -> Result<Self> {
        if materials.is_empty() {
            return Err(Error::Validation(
                "无法识别图片中的材料，请上传更清晰的家具图片".to_string(),
            ));
        }

        Ok(Self {
            report_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            image_url: image_url.into(),
            furniture_type: furniture_type.into(),
            materials,
            risk_assessment,
            disclaimer_accepted,
        })
    }

    pub fn report_id(&self) -> Uuid {
        self.report_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn furniture_type(&self) -> &str {
        &self.furniture_type
    }

    /// Never empty.
    pub fn materials(&self) -> &[MaterialObservation] {
        &self.materials
    }

    /// First material the model listed.
    pub fn primary_material(&self) -> &MaterialObservation {
        &self.materials[0]
    }

    pub fn risk_assessment(&self) -> &RiskAssessment {
        &self.risk_assessment
    }

    pub fn disclaimer_accepted(&self) -> bool {
        self.disclaimer_accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MaterialType, VisualCue};
    use crate::risk::default_assessment;

    fn material() -> MaterialObservation {
        MaterialObservation::new(MaterialType::SolidWood, "橡木", 88.0, VisualCue::default())
            .unwrap()
    }

    #[test]
    fn test_build_rejects_empty_materials() {
        let err = DetectionReport::build(
            "椅子",
            "https://img.example.com/a.jpg",
            vec![],
            default_assessment(),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_build_assigns_fresh_ids() {
        let a = DetectionReport::build("椅子", "u", vec![material()], default_assessment(), true)
            .unwrap();
        let b = DetectionReport::build("椅子", "u", vec![material()], default_assessment(), true)
            .unwrap();
        assert_ne!(a.report_id(), b.report_id());
        assert_eq!(a.primary_material().sub_type(), "橡木");
        assert!(a.disclaimer_accepted());
    }

    #[test]
    fn test_serialized_shape() {
        let report = DetectionReport::build(
            "沙发",
            "https://x/y.jpg",
            vec![material()],
            default_assessment(),
            true,
        )
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["furniture_type"], "沙发");
        assert_eq!(json["image_url"], "https://x/y.jpg");
        assert_eq!(json["materials"][0]["material_type"], "实木类");
        assert_eq!(json["materials"][0]["confidence"], 88.0);
        assert_eq!(json["risk_assessment"]["risk_level"], "中风险");
        assert!(json["report_id"].is_string());
        assert!(json["timestamp"].is_string());
    }
}
