//! 生成后端能力定义 - 业务能力层
//!
//! 只定义"给我一个 prompt（可带图），还我 n 条补全"这一个能力。
//! 后端自己的并发、限流、鉴权策略都不在这里。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::BackendError;

/// 后端能力标签
///
/// 用显式枚举代替按模型名字符串分支。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendCapability {
    /// 多模态：图片作为 vision 内容部分传入
    #[default]
    Vision,
    /// 纯文本：图片由调用方替换为 OCR 文本，追加在 prompt 之后
    Text,
    /// 纯文本 + 推理痕迹：原始输出形如 `content<reason>trace</reason>`
    Reasoning,
}

/// 请求的规范化身份，用于指纹计算
///
/// 三种形态对应三条序列化规则，规则固定且与字段顺序无关：
/// - Text: 指纹即文本本身
/// - Parts: 各部分按给定顺序做 JSON 序列化
/// - Keyed: key 与 payload 的 JSON 序列化直接拼接
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPayload {
    Text(String),
    Parts(Vec<JsonValue>),
    Keyed { key: String, payload: JsonValue },
}

impl PromptPayload {
    /// 计算规范化指纹
    ///
    /// 不变量：两个 WorkItem 指纹相等 ⇒ 视为同一请求，可复用缓存结果。
    pub fn fingerprint(&self) -> String {
        match self {
            PromptPayload::Text(text) => text.clone(),
            PromptPayload::Parts(parts) => {
                serde_json::to_string(parts).unwrap_or_default()
            }
            PromptPayload::Keyed { key, payload } => {
                format!("{}{}", key, serde_json::to_string(payload).unwrap_or_default())
            }
        }
    }
}

/// 一个工作单元：一次后端调用
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// 可选的外部身份键（蒸馏按 question_id 定位请求时使用）
    pub id: Option<String>,
    /// 提示词文本
    pub prompt: String,
    /// 按序编码好的图片（data URL 或 OCR 文本）
    pub images: Vec<String>,
    /// 目标补全条数 N
    pub n: usize,
}

impl WorkItem {
    pub fn new(prompt: String, images: Vec<String>, n: usize) -> Self {
        Self {
            id: None,
            prompt,
            images,
            n,
        }
    }

    pub fn keyed(id: String, prompt: String, n: usize) -> Self {
        Self {
            id: Some(id),
            prompt,
            images: Vec::new(),
            n,
        }
    }

    /// 规范化身份
    pub fn payload(&self) -> PromptPayload {
        if let Some(id) = &self.id {
            return PromptPayload::Keyed {
                key: id.clone(),
                payload: JsonValue::String(self.prompt.clone()),
            };
        }
        if self.images.is_empty() {
            return PromptPayload::Text(self.prompt.clone());
        }
        // 文本在前，图片按原始顺序在后
        let mut parts = vec![json!({ "type": "text", "text": self.prompt })];
        for image in &self.images {
            parts.push(json!({ "type": "image_url", "image_url": image }));
        }
        PromptPayload::Parts(parts)
    }

    pub fn fingerprint(&self) -> String {
        self.payload().fingerprint()
    }
}

/// 后端的原始输出
///
/// 当后端把"展示内容"和"内部推理"分开返回时，
/// 原始字符串形如 `content<reason>trace</reason>`，在这里规范化拆开。
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelOutput {
    Plain(String),
    WithReasoning { content: String, reasoning: String },
}

impl RawModelOutput {
    /// 从可能带 `<reason>` 标签的原始文本构造
    pub fn from_tagged(text: &str) -> Self {
        if let Some(start) = text.find("<reason>") {
            if let Some(end) = text.rfind("</reason>") {
                if end > start {
                    let content = text[..start].to_string();
                    let reasoning = text[start + "<reason>".len()..end].to_string();
                    return RawModelOutput::WithReasoning { content, reasoning };
                }
            }
        }
        RawModelOutput::Plain(text.to_string())
    }

    /// 可见内容部分
    pub fn content(&self) -> &str {
        match self {
            RawModelOutput::Plain(text) => text,
            RawModelOutput::WithReasoning { content, .. } => content,
        }
    }

    /// 推理痕迹（如有）
    pub fn reasoning(&self) -> Option<&str> {
        match self {
            RawModelOutput::Plain(_) => None,
            RawModelOutput::WithReasoning { reasoning, .. } => Some(reasoning),
        }
    }
}

/// 生成后端能力
///
/// 实现方约定：成功时恰好返回 n 条补全字符串。
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 模型短名（用于缓存 / 结果文件命名）
    fn model_repr(&self) -> &str;

    /// 能力标签
    fn capability(&self) -> BackendCapability;

    /// 调用后端，返回 n 条补全
    async fn generate(&self, item: &WorkItem) -> Result<Vec<String>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_text() {
        let item = WorkItem::new("hello".to_string(), vec![], 1);
        assert_eq!(item.fingerprint(), "hello");
    }

    #[test]
    fn test_fingerprint_with_images_is_deterministic() {
        let a = WorkItem::new("p".to_string(), vec!["img1".to_string(), "img2".to_string()], 1);
        let b = WorkItem::new("p".to_string(), vec!["img1".to_string(), "img2".to_string()], 1);
        assert_eq!(a.fingerprint(), b.fingerprint());
        // 图片顺序不同视为不同请求
        let c = WorkItem::new("p".to_string(), vec!["img2".to_string(), "img1".to_string()], 1);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_keyed() {
        let item = WorkItem::keyed("english_1_1_r1".to_string(), "p".to_string(), 1);
        assert_eq!(item.fingerprint(), "english_1_1_r1\"p\"");
    }

    #[test]
    fn test_from_tagged_splits_reasoning() {
        let raw = RawModelOutput::from_tagged("answer text<reason>thinking here</reason>");
        assert_eq!(raw.content(), "answer text");
        assert_eq!(raw.reasoning(), Some("thinking here"));
    }

    #[test]
    fn test_from_tagged_plain() {
        let raw = RawModelOutput::from_tagged("no tags here");
        assert_eq!(raw, RawModelOutput::Plain("no tags here".to_string()));
        assert_eq!(raw.reasoning(), None);
    }
}
