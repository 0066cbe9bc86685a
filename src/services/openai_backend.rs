//! OpenAI 兼容后端 - 业务能力层
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao, vLLM 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::{GenerationConfig, ModelConfig};
use crate::error::BackendError;
use crate::services::backend::{BackendCapability, GenerationBackend, WorkItem};

/// OpenAI 兼容后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
    model_repr: String,
    capability: BackendCapability,
    generation: GenerationConfig,
}

impl OpenAiBackend {
    /// 创建新的后端实例
    pub fn new(model: &ModelConfig, generation: &GenerationConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&model.api_key);
        if let Some(api_base) = &model.api_base {
            openai_config = openai_config.with_api_base(api_base);
        }

        Self {
            client: Client::with_config(openai_config),
            model_name: model.model_name.clone(),
            model_repr: model.repr().to_string(),
            capability: model.capability,
            generation: generation.clone(),
        }
    }

    /// 构建用户消息
    ///
    /// 多模态后端：文本 + 图片内容部分；
    /// 纯文本后端：OCR 文本直接追加到 prompt 之后。
    fn build_user_message(
        &self,
        item: &WorkItem,
    ) -> Result<ChatCompletionRequestMessage, BackendError> {
        let builder = match self.capability {
            BackendCapability::Vision if !item.images.is_empty() => {
                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    vec![ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText {
                            text: item.prompt.clone(),
                        },
                    )];

                for url in &item.images {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", item.images.len());

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(
                        content_parts,
                    ))
                    .build()
            }
            _ if !item.images.is_empty() => {
                // 纯文本后端：图片内容已由调用方替换为 OCR 文本
                let combined = format!("{}\n{}", item.prompt, item.images.join("\n"));
                ChatCompletionRequestUserMessageArgs::default()
                    .content(combined)
                    .build()
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(item.prompt.clone())
                .build(),
        };

        let user_msg = builder.map_err(|e| BackendError::ApiCallFailed {
            model: self.model_name.clone(),
            source: Box::new(e),
        })?;

        Ok(ChatCompletionRequestMessage::User(user_msg))
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn model_repr(&self) -> &str {
        &self.model_repr
    }

    fn capability(&self) -> BackendCapability {
        self.capability
    }

    async fn generate(&self, item: &WorkItem) -> Result<Vec<String>, BackendError> {
        debug!(
            "调用后端 API，模型: {}, n: {}, prompt 长度: {} 字符",
            self.model_name,
            item.n,
            item.prompt.len()
        );

        let messages = vec![self.build_user_message(item)?];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .n(item.n as u8)
            .temperature(self.generation.temperature)
            .max_tokens(self.generation.max_tokens)
            .build()
            .map_err(|e| BackendError::ApiCallFailed {
                model: self.model_name.clone(),
                source: Box::new(e),
            })?;

        let response =
            self.client
                .chat()
                .create(request)
                .await
                .map_err(|e| BackendError::ApiCallFailed {
                    model: self.model_name.clone(),
                    source: Box::new(e),
                })?;

        if response.choices.is_empty() {
            return Err(BackendError::EmptyResponse {
                model: self.model_name.clone(),
            });
        }

        let completions: Vec<String> = response
            .choices
            .iter()
            .map(|choice| {
                choice
                    .message
                    .content
                    .clone()
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .collect();

        debug!("后端 API 调用成功，返回 {} 条补全", completions.len());

        Ok(completions)
    }
}
