//! Turns the model's free-text answer into typed observations.
//!
//! Models often wrap their JSON in prose or markdown fences, so the parser
//! looks for the first balanced `{...}` block that is valid JSON and ignores
//! the rest of the text.

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::models::{MaterialObservation, MaterialType, VisualCue};

/// Furniture type used when the model does not name one.
pub const UNKNOWN_FURNITURE: &str = "未知家具";

/// Structured answer from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FurnitureAnalysis {
    pub furniture_type: String,
    /// May be empty; the caller decides what that means.
    pub materials: Vec<MaterialObservation>,
}

/// Outcome of parsing a model answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    /// A JSON object of the declared shape was found.
    Structured(FurnitureAnalysis),
    /// The answer contains no JSON object at all.
    Unstructured(String),
    /// JSON-looking text was found but did not parse into the declared shape.
    Malformed { raw: String, error: String },
}

impl ParsedResponse {
    /// The analysis, if the answer was structured.
    pub fn into_analysis(self) -> Option<FurnitureAnalysis> {
        match self {
            ParsedResponse::Structured(analysis) => Some(analysis),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    furniture_type: Option<String>,
    /// Decoded one by one so a single odd entry does not sink the rest.
    #[serde(default)]
    materials: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMaterial {
    #[serde(default)]
    material_type: Option<String>,
    #[serde(default)]
    sub_type: Option<String>,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    visual_cues: Option<RawCues>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCues {
    #[serde(default)]
    texture: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
}

/// Parse a raw model answer.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut candidates = json_blocks(text).peekable();
    if candidates.peek().is_none() {
        warn!("Model answer contains no JSON object, keeping raw text");
        return ParsedResponse::Unstructured(text.to_string());
    }

    let mut last_error = String::new();
    for block in candidates {
        let value = match serde_json::from_str::<Value>(block) {
            Ok(value) => value,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };

        return match serde_json::from_value::<RawAnalysis>(value) {
            Ok(raw) => ParsedResponse::Structured(into_analysis(raw)),
            Err(e) => {
                warn!("Model JSON has unexpected shape: {}", e);
                ParsedResponse::Malformed {
                    raw: text.to_string(),
                    error: e.to_string(),
                }
            }
        };
    }

    warn!("No valid JSON object in model answer: {}", last_error);
    ParsedResponse::Malformed {
        raw: text.to_string(),
        error: last_error,
    }
}

/// Balanced `{...}` blocks in order of their opening brace.
///
/// Braces inside JSON string literals are ignored. Blocks that never close
/// are skipped.
pub fn json_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(move |(start, _)| balanced_from(text, start))
}

fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn into_analysis(raw: RawAnalysis) -> FurnitureAnalysis {
    let furniture_type = raw
        .furniture_type
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN_FURNITURE.to_string());

    let materials = raw
        .materials
        .into_iter()
        .filter_map(into_observation)
        .collect();

    FurnitureAnalysis {
        furniture_type,
        materials,
    }
}

fn into_observation(entry: Value) -> Option<MaterialObservation> {
    let raw: RawMaterial = match serde_json::from_value(entry) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Dropping material with unexpected shape: {}", e);
            return None;
        }
    };

    let label = raw.material_type.unwrap_or_default();
    let Some(material_type) = MaterialType::from_label(&label) else {
        warn!("Dropping material with unknown type '{}'", label);
        return None;
    };

    let Some(confidence) = confidence_value(&raw.confidence) else {
        warn!("Dropping material with unreadable confidence {}", raw.confidence);
        return None;
    };

    let cues = raw.visual_cues.unwrap_or_default();
    let visual_cues = VisualCue {
        texture: cues.texture.unwrap_or_default(),
        color: cues.color.unwrap_or_default(),
        pattern: cues.pattern.unwrap_or_default(),
    };

    MaterialObservation::new(
        material_type,
        raw.sub_type.unwrap_or_default(),
        confidence,
        visual_cues,
    )
    .map_err(|e| warn!("Dropping material: {}", e))
    .ok()
}

/// Confidence may arrive as a number, a numeric string, or "85%".
/// Missing confidence counts as zero.
fn confidence_value(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSWER: &str = r#"{
        "furniture_type": "书柜",
        "materials": [
            {
                "material_type": "人造板类",
                "sub_type": "密度板",
                "confidence": 85,
                "visual_cues": {"texture": "表面平整光滑", "color": "白色", "pattern": "无明显纹理"}
            }
        ]
    }"#;

    #[test]
    fn test_parses_bare_json() {
        let analysis = parse_response(ANSWER).into_analysis().unwrap();
        assert_eq!(analysis.furniture_type, "书柜");
        assert_eq!(analysis.materials.len(), 1);
        let m = &analysis.materials[0];
        assert_eq!(m.material_type(), MaterialType::EngineeredWood);
        assert_eq!(m.sub_type(), "密度板");
        assert_eq!(m.confidence(), 85.0);
        assert_eq!(m.visual_cues().color, "白色");
    }

    #[test]
    fn test_extracts_json_from_prose() {
        let text = format!("Here is the result: {} Thank you.", ANSWER);
        let analysis = parse_response(&text).into_analysis().unwrap();
        assert_eq!(analysis.materials[0].sub_type(), "密度板");
    }

    #[test]
    fn test_extracts_json_from_markdown_fence() {
        let text = format!("分析如下：\n```json\n{}\n```\n如有疑问请咨询专业人士。", ANSWER);
        assert!(matches!(parse_response(&text), ParsedResponse::Structured(_)));
    }

    #[test]
    fn test_skips_prose_braces_before_json() {
        let text = format!("Format is {{furniture_type}} as requested. {}", ANSWER);
        let analysis = parse_response(&text).into_analysis().unwrap();
        assert_eq!(analysis.furniture_type, "书柜");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"furniture_type": "椅子 {带扶手}", "materials": []} trailing }"#;
        let analysis = parse_response(text).into_analysis().unwrap();
        assert_eq!(analysis.furniture_type, "椅子 {带扶手}");
        assert!(analysis.materials.is_empty());
    }

    #[test]
    fn test_plain_text_is_unstructured() {
        let text = "抱歉，图片中没有家具。";
        assert_eq!(
            parse_response(text),
            ParsedResponse::Unstructured(text.to_string())
        );
    }

    #[test]
    fn test_unclosed_json_is_unstructured() {
        assert!(matches!(
            parse_response(r#"{"furniture_type": "椅子""#),
            ParsedResponse::Unstructured(_)
        ));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let parsed = parse_response("result: {furniture_type: 椅子}");
        assert!(matches!(parsed, ParsedResponse::Malformed { .. }));
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let parsed = parse_response(r#"{"materials": "密度板"}"#);
        match parsed {
            ParsedResponse::Malformed { raw, error } => {
                assert!(raw.contains("密度板"));
                assert!(!error.is_empty());
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_confidence_out_of_range_is_clamped() {
        let text = r#"{"materials": [
            {"material_type": "布类", "sub_type": "布艺", "confidence": 130},
            {"material_type": "皮革类", "sub_type": "真皮", "confidence": -20},
            {"material_type": "实木类", "sub_type": "橡木", "confidence": "92%"}
        ]}"#;
        let analysis = parse_response(text).into_analysis().unwrap();
        let confidences: Vec<f64> = analysis.materials.iter().map(|m| m.confidence()).collect();
        assert_eq!(confidences, vec![100.0, 0.0, 92.0]);
        assert!(confidences.iter().all(|c| (0.0..=100.0).contains(c)));
        assert_eq!(analysis.furniture_type, UNKNOWN_FURNITURE);
    }

    #[test]
    fn test_drops_unknown_material_types() {
        let text = r#"{"furniture_type": "桌子", "materials": [
            {"material_type": "金属类", "sub_type": "不锈钢", "confidence": 90},
            {"material_type": "实木类", "sub_type": "松木", "confidence": "high"},
            {"material_type": "实木类", "sub_type": "橡木"}
        ]}"#;
        let analysis = parse_response(text).into_analysis().unwrap();
        assert_eq!(analysis.materials.len(), 1);
        assert_eq!(analysis.materials[0].sub_type(), "橡木");
        assert_eq!(analysis.materials[0].confidence(), 0.0);
        assert_eq!(analysis.materials[0].visual_cues(), &VisualCue::default());
    }

    #[test]
    fn test_misshaped_entry_does_not_sink_its_siblings() {
        let text = r#"{"furniture_type": "沙发", "materials": [
            {"material_type": "皮革类", "sub_type": "真皮", "confidence": 90},
            {"material_type": "布类", "sub_type": "布艺", "confidence": 70, "visual_cues": "无"},
            {"material_type": "布类", "sub_type": 42, "confidence": 70},
            "科技布"
        ]}"#;
        let analysis = parse_response(text).into_analysis().unwrap();
        assert_eq!(analysis.furniture_type, "沙发");
        assert_eq!(analysis.materials.len(), 1);
        assert_eq!(analysis.materials[0].sub_type(), "真皮");
        assert_eq!(analysis.materials[0].confidence(), 90.0);
    }

    #[test]
    fn test_blank_sub_type_is_dropped() {
        let text = r#"{"materials": [
            {"material_type": "实木类", "confidence": 80},
            {"material_type": "实木类", "sub_type": "  ", "confidence": 80},
            {"material_type": "实木类", "sub_type": "松木", "confidence": 80}
        ]}"#;
        let analysis = parse_response(text).into_analysis().unwrap();
        assert_eq!(analysis.materials.len(), 1);
        assert_eq!(analysis.materials[0].sub_type(), "松木");
    }

    #[test]
    fn test_json_blocks_order() {
        let blocks: Vec<&str> = json_blocks(r#"a {"x": {"y": 1}} b {"z": 2}"#).collect();
        assert_eq!(blocks, vec![r#"{"x": {"y": 1}}"#, r#"{"y": 1}"#, r#"{"z": 2}"#]);
    }
}
