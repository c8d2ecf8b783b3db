//! Instruction composition and the upstream request body.
//!
//! A caller prompt travels as a system message ahead of the user message so
//! the model treats it as the higher-priority instruction. The user message
//! then only carries the images and a short neutral request.

use serde::Serialize;

use crate::models::EncodedImage;

// ── Constants ────────────────────────────────────────────────────────────────

pub const BASE_INSTRUCTION: &str = concat!(
    "将这些图片的内容合并为一段不超过50字的朋友圈文案：",
    "语言自然流畅，使用短句与意象，避免列举与口号；",
    "删除重复并修正错字/断词；",
    "只输出正文，不要标题、序号、标签或解释。"
);

pub const NEUTRAL_USER_INSTRUCTION: &str = "请根据以上图片生成文案。";

pub const ENGLISH_DIRECTIVE: &str = "Please respond in English.";

const ENGLISH_MARKERS: &[&str] = &["english", "英文", "英语"];
const EXISTING_DIRECTIVE: &str = "please respond in english";

// ── Instructions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub system: Option<String>,
    pub user: String,
}

pub fn compose_instructions(prompt: Option<&str>) -> Instructions {
    match prompt.map(str::trim).filter(|p| !p.is_empty()) {
        None => Instructions {
            system: None,
            user: BASE_INSTRUCTION.to_string(),
        },
        Some(prompt) => {
            let merged = format!("{}\n{}", BASE_INSTRUCTION, prompt);
            Instructions {
                system: Some(ensure_english_directive(&merged)),
                user: NEUTRAL_USER_INSTRUCTION.to_string(),
            }
        }
    }
}

/// Append [`ENGLISH_DIRECTIVE`] when the text asks for English but does not
/// already say so explicitly. Plain substring checks, case-insensitive.
pub fn ensure_english_directive(text: &str) -> String {
    let lower = text.to_lowercase();
    let wants_english = ENGLISH_MARKERS.iter().any(|m| lower.contains(m));
    if wants_english && !lower.contains(EXISTING_DIRECTIVE) {
        format!("{}\n{}", text.trim_end(), ENGLISH_DIRECTIVE)
    } else {
        text.to_string()
    }
}

// ── Upstream payload ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParameters {
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub input: PayloadInput,
    pub parameters: PayloadParameters,
}

#[derive(Debug, Serialize)]
pub struct PayloadInput {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct PayloadParameters {
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ContentBlock {
    Image { image: String },
    Text { text: String },
}

impl UpstreamPayload {
    pub fn new(
        model: &str,
        images: &[EncodedImage],
        system_prompt: Option<&str>,
        user_prompt: &str,
        params: GenerationParameters,
    ) -> Self {
        let mut messages = Vec::with_capacity(2);

        if let Some(system) = system_prompt {
            messages.push(Message {
                role: "system",
                content: vec![ContentBlock::Text {
                    text: system.to_string(),
                }],
            });
        }

        let mut content: Vec<ContentBlock> = images
            .iter()
            .map(|img| ContentBlock::Image {
                image: img.to_data_uri(),
            })
            .collect();
        content.push(ContentBlock::Text {
            text: user_prompt.to_string(),
        });
        messages.push(Message {
            role: "user",
            content,
        });

        Self {
            model: model.to_string(),
            input: PayloadInput { messages },
            parameters: PayloadParameters {
                max_tokens: params.max_tokens,
                temperature: params.temperature,
            },
        }
    }
}
