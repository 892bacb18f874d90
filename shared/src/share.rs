//! Share card payloads built from cached reports.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::models::{ShareCard, TemplateStyle};
use crate::report::DetectionReport;
use crate::vlm::VlmClient;

/// How long a share card stays valid.
pub const CARD_LIFETIME_DAYS: i64 = 7;

/// Build the share card for a report, asking the model for a catchphrase.
///
/// Never fails: the catchphrase falls back to a fixed line.
pub async fn build_share_card(
    vlm: &VlmClient,
    report: &DetectionReport,
    template_style: TemplateStyle,
) -> ShareCard {
    let headline = report.primary_material().clone();
    let risk = report.risk_assessment();
    let catchphrase = vlm.generate_catchphrase(&headline, risk.risk_level).await;

    let created_at = Utc::now();
    let card = ShareCard {
        card_id: Uuid::new_v4(),
        report_id: report.report_id(),
        catchphrase,
        template_style,
        furniture_type: report.furniture_type().to_string(),
        headline_material: headline,
        risk_level: risk.risk_level,
        recommendations: risk.recommendations.iter().take(3).cloned().collect(),
        report_path: format!("/pages/report/report?id={}", report.report_id()),
        created_at,
        expires_at: created_at + Duration::days(CARD_LIFETIME_DAYS),
    };

    info!("Share card {} built for report {}", card.card_id, card.report_id);
    card
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MaterialObservation, MaterialType, RiskLevel, VisualCue};
    use crate::risk::default_assessment;
    use crate::vlm::{ChatRequest, ModelCallError, RetryPolicy, VisionModel, FALLBACK_CATCHPHRASE};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct DownModel;

    #[async_trait]
    impl VisionModel for DownModel {
        async fn complete(&self, _: &ChatRequest) -> Result<String, ModelCallError> {
            Err(ModelCallError::Timeout)
        }
    }

    #[tokio::test]
    async fn test_card_from_report() {
        let vlm = VlmClient::new(Arc::new(DownModel), "m", RetryPolicy::default());
        let materials = vec![
            MaterialObservation::new(MaterialType::Leather, "PU皮", 66.0, VisualCue::default())
                .unwrap(),
            MaterialObservation::new(MaterialType::SolidWood, "松木", 80.0, VisualCue::default())
                .unwrap(),
        ];
        let report =
            DetectionReport::build("沙发", "https://img/x.jpg", materials, default_assessment(), true)
                .unwrap();

        let card = build_share_card(&vlm, &report, TemplateStyle::Minimal).await;
        assert_eq!(card.report_id, report.report_id());
        assert_eq!(card.catchphrase, FALLBACK_CATCHPHRASE);
        assert_eq!(card.headline_material.sub_type(), "PU皮");
        assert_eq!(card.risk_level, RiskLevel::Medium);
        assert_eq!(card.recommendations.len(), 2);
        assert_eq!(card.expires_at - card.created_at, Duration::days(7));
        assert!(card.report_path.ends_with(&report.report_id().to_string()));
    }
}
