//! 数据集行模型
//!
//! 一行对应一个子问题。除显式建模的字段外，其余列通过
//! `#[serde(flatten)]` 原样保留，保证合并输出时不丢失原始数据。

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 数据集中的一行（一个子问题）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// 题目唯一标识，如 english_1_2_r1
    pub question_id: String,
    /// 共享上下文（同一主题的所有子题共用，取第一个子题的）
    #[serde(default)]
    pub context: String,
    /// 题干
    pub question: String,
    /// 题型：multiple-choice 或 open-ended
    pub question_type: String,
    /// 选项（仅选择题有；可能是字符串化的列表）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonValue>,
    /// 题目语言
    pub language: String,
    /// 主题号（从 1 开始，同一 release+语言内连续）
    #[serde(deserialize_with = "u32_lenient")]
    pub main_question_id: u32,
    /// 子题号（从 1 开始，同一主题内连续）
    #[serde(deserialize_with = "u32_lenient")]
    pub sub_question_id: u32,
    /// 数据集版本
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// 标准答案（评测用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<String>,
    /// 其余未建模的列（image_1..image_7、explanation、subfield 等）
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl QuestionRecord {
    /// 收集本行引用的图片路径（image_1 .. image_7，按序号顺序）
    ///
    /// 值为 null 或字符串 "None" 视为无图。
    pub fn image_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for i in 1..=7 {
            let key = format!("image_{}", i);
            match self.extra.get(&key) {
                Some(JsonValue::String(s)) if !s.is_empty() && s != "None" => {
                    paths.push(s.clone());
                }
                _ => {}
            }
        }
        paths
    }

    /// 转换为 JSON 对象，用于与模型回答合并后写入结果存储
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// 兼容数字与字符串两种形式的 u32 反序列化
///
/// 数据集经过多次转换，题号列有时是 "3" 有时是 3。
fn u32_lenient<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    struct U32Visitor;

    impl Visitor<'_> for U32Visitor {
        type Value = u32;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("整数或整数字符串")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
            u32::try_from(v).map_err(E::custom)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
            v.trim().parse::<u32>().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(U32Visitor)
}
