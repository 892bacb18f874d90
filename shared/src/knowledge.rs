//! Material knowledge base.
//!
//! The catalog is loaded once at startup and never mutated afterwards, so it
//! can be shared across requests behind an `Arc` without locking. Lookups are
//! linear scans; the catalog is a few dozen entries.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{MaterialType, RiskAssessment, VisualCue};
use crate::{Error, Result};

/// One catalogued material and its pre-authored risk profile.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub category: String,
    pub material_type: MaterialType,
    pub sub_type: String,
    #[serde(default)]
    pub description: Option<String>,
    pub visual_cues: VisualCue,
    pub risk_assessment: RiskAssessment,
}

#[derive(Debug, Deserialize)]
struct Catalog {
    materials: Vec<KnowledgeEntry>,
}

/// Read-only index over the material catalog.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Load and validate the catalog file. Any problem is fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::KnowledgeBase(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let kb = Self::from_json(&raw)?;
        info!(
            "Loaded knowledge base from {} ({} materials)",
            path.display(),
            kb.len()
        );
        Ok(kb)
    }

    /// Parse a catalog document, rejecting it whole if any entry is invalid.
    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(raw)
            .map_err(|e| Error::KnowledgeBase(format!("Malformed catalog: {}", e)))?;
        Self::from_entries(catalog.materials)
    }

    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Result<Self> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(Error::KnowledgeBase("Entry with empty id".to_string()));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(Error::KnowledgeBase(format!("Duplicate id: {}", entry.id)));
            }
            if entry.sub_type.trim().is_empty() {
                return Err(Error::KnowledgeBase(format!(
                    "Entry {} has an empty sub_type",
                    entry.id
                )));
            }
            let score = entry.risk_assessment.risk_score;
            if !(0.0..=100.0).contains(&score) {
                return Err(Error::KnowledgeBase(format!(
                    "Entry {} has risk_score {} outside 0-100",
                    entry.id, score
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in catalog order.
    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Exact sub-type match. The first entry in catalog order wins.
    pub fn find_by_sub_type(&self, sub_type: &str) -> Option<&KnowledgeEntry> {
        let found = self.entries.iter().find(|e| e.sub_type == sub_type);
        if found.is_none() {
            debug!("No catalog entry for sub_type '{}'", sub_type);
        }
        found
    }

    pub fn find_by_material_type(&self, material_type: MaterialType) -> Vec<&KnowledgeEntry> {
        self.entries
            .iter()
            .filter(|e| e.material_type == material_type)
            .collect()
    }

    /// Rank entries by how many supplied cues appear inside the entry's cue text.
    ///
    /// Each supplied cue that is a substring of the corresponding catalog field
    /// scores one point. Entries scoring zero are dropped and ties keep catalog
    /// order. This is keyword containment, not semantic similarity: "深棕色"
    /// will not match "棕褐色".
    pub fn find_by_visual_cues(
        &self,
        texture: Option<&str>,
        color: Option<&str>,
        pattern: Option<&str>,
    ) -> Vec<&KnowledgeEntry> {
        let mut scored: Vec<(usize, &KnowledgeEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                let cues = &entry.visual_cues;
                let score = [
                    (texture, cues.texture.as_str()),
                    (color, cues.color.as_str()),
                    (pattern, cues.pattern.as_str()),
                ]
                .iter()
                .filter(|(query, field)| match query {
                    Some(q) if !q.is_empty() => field.contains(q),
                    _ => false,
                })
                .count();
                (score, entry)
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // sort_by is stable, so equal scores stay in catalog order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Visual cue query matched {} entries", scored.len());
        scored.into_iter().map(|(_, entry)| entry).collect()
    }

    pub fn risk_assessment_for(&self, id: &str) -> Option<&RiskAssessment> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| &e.risk_assessment)
    }
}
