//! Maps observations onto catalog risk profiles.

use std::sync::Arc;

use tracing::{debug, info};

use crate::knowledge::KnowledgeBase;
use crate::models::{MaterialObservation, RiskAssessment, RiskLevel};

/// Resolves risk for observations. Never fails: a catalog miss yields the
/// conservative default profile.
#[derive(Debug, Clone)]
pub struct RiskResolver {
    knowledge_base: Arc<KnowledgeBase>,
}

impl RiskResolver {
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self { knowledge_base }
    }

    /// Catalog risk profile for the observation's sub-type, or the default.
    pub fn resolve(&self, observation: &MaterialObservation) -> RiskAssessment {
        self.lookup(observation)
            .unwrap_or_else(|| {
                debug!(
                    "No catalog match for '{}', using default profile",
                    observation.sub_type()
                );
                default_assessment()
            })
    }

    /// Risk profile for a whole report: the first observation, in model
    /// order, whose sub-type is catalogued. Default when none is.
    pub fn resolve_all(&self, observations: &[MaterialObservation]) -> RiskAssessment {
        match observations.iter().find_map(|obs| self.lookup(obs)) {
            Some(assessment) => assessment,
            None => {
                info!(
                    "None of {} observed sub-types are catalogued, using default profile",
                    observations.len()
                );
                default_assessment()
            }
        }
    }

    fn lookup(&self, observation: &MaterialObservation) -> Option<RiskAssessment> {
        self.knowledge_base
            .find_by_sub_type(observation.sub_type())
            .map(|entry| entry.risk_assessment.clone())
    }
}

/// Conservative profile used when a material is not catalogued.
pub fn default_assessment() -> RiskAssessment {
    RiskAssessment {
        risk_level: RiskLevel::Medium,
        risk_score: 50.0,
        harmful_substances: vec!["未知".to_string()],
        sensitive_groups: vec![
            "婴幼儿".to_string(),
            "孕妇".to_string(),
            "呼吸道敏感人群".to_string(),
        ],
        health_impacts: vec!["建议咨询专业人士".to_string()],
        recommendations: vec!["定期通风".to_string(), "保持室内空气流通".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MaterialType, VisualCue};

    fn resolver() -> RiskResolver {
        let kb = KnowledgeBase::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/knowledge_base.json"
        ))
        .unwrap();
        RiskResolver::new(Arc::new(kb))
    }

    fn obs(material_type: MaterialType, sub_type: &str) -> MaterialObservation {
        MaterialObservation::new(material_type, sub_type, 80.0, VisualCue::default()).unwrap()
    }

    #[test]
    fn test_resolve_catalogued_sub_type() {
        let risk = resolver().resolve(&obs(MaterialType::EngineeredWood, "密度板"));
        assert_eq!(risk.risk_level, RiskLevel::High);
        assert_eq!(risk.risk_score, 75.0);
    }

    #[test]
    fn test_resolve_unknown_sub_type_uses_default() {
        let risk = resolver().resolve(&obs(MaterialType::Fabric, "神秘面料"));
        assert_eq!(risk, default_assessment());
        assert_eq!(risk.risk_level, RiskLevel::Medium);
        assert_eq!(risk.risk_score, 50.0);
        assert_eq!(risk.harmful_substances, vec!["未知"]);
        assert_eq!(risk.sensitive_groups.len(), 3);
    }

    #[test]
    fn test_resolve_all_takes_first_catalogued() {
        let observations = vec![
            obs(MaterialType::Fabric, "神秘面料"),
            obs(MaterialType::SolidWood, "橡木"),
            obs(MaterialType::EngineeredWood, "密度板"),
        ];
        let risk = resolver().resolve_all(&observations);
        assert_eq!(risk.risk_level, RiskLevel::Low);
        assert_eq!(risk.risk_score, 15.0);
    }

    #[test]
    fn test_resolve_all_without_matches_uses_default() {
        let risk = resolver().resolve_all(&[obs(MaterialType::Leather, "鸵鸟皮")]);
        assert_eq!(risk, default_assessment());
        assert_eq!(resolver().resolve_all(&[]), default_assessment());
    }
}
