//! Vision-language model client.
//!
//! Builds the material-analysis prompt, calls the model with bounded retries
//! and exponential backoff, and parses the answer into observations.

pub mod model;
pub mod parse;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::models::{MaterialObservation, RiskLevel};
use crate::{Error, Result};

pub use model::{
    ChatMessage, ChatRequest, ContentPart, ImageUrl, MessageContent, ModelCallError,
    OpenAiCompatibleModel, Role, VisionModel,
};
pub use parse::{parse_response, FurnitureAnalysis, ParsedResponse};

/// Returned by [`VlmClient::generate_catchphrase`] whenever the model fails.
pub const FALLBACK_CATCHPHRASE: &str = "健康家居，从材料开始";

const DEFAULT_USER_PROMPT: &str = "请分析这张家具图片的材料";

const ANALYSIS_PROMPT: &str = r#"你是一名家具材料识别专家。请按以下步骤分析图片中的家具：

1. 判断家具类型（如椅子、沙发、桌子、柜子）。
2. 对每一种可见材料：
   - 归入且只能归入以下四类之一：实木类、人造板类、皮革类、布类
   - 给出具体子类型（如实木拼板、橡木、密度板、刨花板、真皮、PU皮、棉麻布艺）
   - 给出 0-100 的识别置信度
3. 为每种材料描述视觉特征：纹理(texture)、颜色(color)、图案(pattern)。

只输出如下结构的 JSON 对象：
{
  "furniture_type": "家具类型",
  "materials": [
    {
      "material_type": "实木类/人造板类/皮革类/布类",
      "sub_type": "具体子类型",
      "confidence": 85,
      "visual_cues": {
        "texture": "纹理描述",
        "color": "颜色描述",
        "pattern": "图案描述"
      }
    }
  ]
}

要求：置信度必须在 0-100 之间；材料类型必须是四类之一；无法识别时 materials 返回空数组。"#;

/// Exponential backoff between model attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait after the zero-based `attempt` failed: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Client for material analysis and share-card copy.
pub struct VlmClient {
    model: Arc<dyn VisionModel>,
    model_name: String,
    retry: RetryPolicy,
}

impl VlmClient {
    pub fn new(
        model: Arc<dyn VisionModel>,
        model_name: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            retry,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Analyse the furniture photo at `image_url`.
    ///
    /// Transport failures are retried; once attempts run out the call fails
    /// with [`Error::ExternalService`]. An answer that does not parse is not
    /// an error here: it comes back as [`ParsedResponse::Unstructured`] or
    /// [`ParsedResponse::Malformed`].
    pub async fn analyze(&self, image_url: &str, context: Option<&str>) -> Result<ParsedResponse> {
        let request = self.analysis_request(image_url, context);
        let answer = self.complete_with_retry(&request).await?;
        Ok(parse_response(&answer))
    }

    fn analysis_request(&self, image_url: &str, context: Option<&str>) -> ChatRequest {
        let user_text = context
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_USER_PROMPT);

        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text(ANALYSIS_PROMPT.to_string()),
                },
                ChatMessage {
                    role: Role::User,
                    content: MessageContent::Parts(vec![
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: image_url.to_string(),
                            },
                        },
                        ContentPart::Text {
                            text: user_text.to_string(),
                        },
                    ]),
                },
            ],
            temperature: 0.7,
            max_tokens: 2000,
            stream: false,
        }
    }

    async fn complete_with_retry(&self, request: &ChatRequest) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            info!(
                "Calling vision model {} (attempt {}/{})",
                self.model_name,
                attempt + 1,
                max_attempts
            );

            match self.model.complete(request).await {
                Ok(answer) => {
                    info!("Vision model answered on attempt {}", attempt + 1);
                    return Ok(answer);
                }
                Err(e) if !e.is_retryable() => {
                    error!("Vision model call failed permanently: {}", e);
                    return Err(Error::model(attempt + 1, e.to_string()));
                }
                Err(e) => {
                    warn!("Vision model attempt {} failed: {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.retry.delay_for(attempt);
                info!("Retrying vision model in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        error!("Vision model failed after {} attempts: {}", max_attempts, message);
        Err(Error::model(max_attempts, message))
    }

    /// One-line share-card slogan for a material. Single attempt; any failure
    /// yields [`FALLBACK_CATCHPHRASE`].
    pub async fn generate_catchphrase(
        &self,
        material: &MaterialObservation,
        risk_level: RiskLevel,
    ) -> String {
        let prompt = format!(
            "根据以下家具材料信息，写一句简短、有趣、易记的金句（不超过20字）：\n\n\
             材料类型：{}\n子类型：{}\n风险等级：{}\n\n\
             要求：朗朗上口，突出材料特点或健康提示，适合社交分享。只返回金句本身。",
            material.material_type(),
            material.sub_type(),
            risk_level
        );

        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: Role::User,
                content: MessageContent::Text(prompt),
            }],
            temperature: 0.9,
            max_tokens: 100,
            stream: false,
        };

        match self.model.complete(&request).await {
            Ok(answer) => {
                let phrase = answer.trim().trim_matches(|c: char| c == '"' || c == '“' || c == '”');
                if phrase.is_empty() {
                    FALLBACK_CATCHPHRASE.to_string()
                } else {
                    phrase.to_string()
                }
            }
            Err(e) => {
                error!("Catchphrase generation failed: {}", e);
                FALLBACK_CATCHPHRASE.to_string()
            }
        }
    }
}
