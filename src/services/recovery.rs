//! 响应恢复管线 - 业务能力层
//!
//! ## 职责
//!
//! 把不可靠的半结构化模型输出转成按题目校验过的
//! {answer, explanation} 映射。严格按阶梯降级：
//!
//! 1. 直接按 JSON 解析可见内容
//! 2. 结构修复后重试（剥代码围栏、剥前后散文）
//! 3. 逐题正则抽取（容忍空白和引号差异）
//! 4. 彻底失败：记 warn，返回 Failed，由调用方按组失败处理
//!
//! 答案和解释始终按文本携带，数值 / 布尔的解释交给下游评分。

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::services::backend::RawModelOutput;
use crate::services::prompt::FormattedOptions;

/// 单个题目的恢复结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnswerRecord {
    pub answer: String,
    pub explanation: String,
}

/// 题目 id → 恢复结果
pub type ParsedAnswerMap = BTreeMap<String, AnswerRecord>;

/// 恢复管线的带标签结果
#[derive(Debug, Clone, PartialEq)]
pub enum Recovered {
    /// 第 1 阶段：直接结构化解析成功
    Parsed {
        answers: ParsedAnswerMap,
        reasoning: Option<String>,
    },
    /// 第 2 / 3 阶段：修复或逐题抽取后得到的结果
    Degraded {
        answers: ParsedAnswerMap,
        reasoning: Option<String>,
    },
    /// 任何阶段都无法恢复
    Failed,
}

impl Recovered {
    /// 取出答案映射（Failed 为 None）
    pub fn answers(&self) -> Option<&ParsedAnswerMap> {
        match self {
            Recovered::Parsed { answers, .. } | Recovered::Degraded { answers, .. } => {
                Some(answers)
            }
            Recovered::Failed => None,
        }
    }

    /// 推理痕迹（如有）
    pub fn reasoning(&self) -> Option<&str> {
        match self {
            Recovered::Parsed { reasoning, .. } | Recovered::Degraded { reasoning, .. } => {
                reasoning.as_deref()
            }
            Recovered::Failed => None,
        }
    }
}

/// 恢复一个组的模型输出
///
/// 不变量：只要不是 Failed，返回映射的键集恰好等于 expected_ids。
pub fn recover(raw: &RawModelOutput, expected_ids: &[String]) -> Recovered {
    if expected_ids.is_empty() {
        warn!("⚠️ 期望题目列表为空，无法恢复任何内容。原始输出: {}", raw.content());
        return Recovered::Failed;
    }

    let reasoning = raw.reasoning().map(|s| s.to_string());
    let content = raw.content();

    // 第 1 阶段：直接结构化解析
    if let Some(answers) = try_structured_parse(content, expected_ids) {
        return Recovered::Parsed { answers, reasoning };
    }

    // 第 2 阶段：结构修复后重试
    if let Some(repaired) = repair_json_text(content) {
        if let Some(answers) = try_structured_parse(&repaired, expected_ids) {
            return Recovered::Degraded { answers, reasoning };
        }
    }

    // 第 3 阶段：逐题正则抽取
    info!("结构化解析失败，改用正则逐题抽取");
    let answers = extract_per_question(content, expected_ids);
    Recovered::Degraded { answers, reasoning }
}

/// 按 JSON 解析，要求每个期望 id 都在且带 answer 字段
fn try_structured_parse(text: &str, expected_ids: &[String]) -> Option<ParsedAnswerMap> {
    let value: JsonValue = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;

    let mut answers = ParsedAnswerMap::new();
    for id in expected_ids {
        let entry = object.get(id)?.as_object()?;
        let answer = value_to_text(entry.get("answer")?);
        let explanation = entry
            .get("explanation")
            .map(value_to_text)
            .unwrap_or_default();
        answers.insert(
            id.clone(),
            AnswerRecord {
                answer,
                explanation,
            },
        );
    }
    Some(answers)
}

/// 尽力修复：剥掉代码围栏和最外层花括号之外的散文
fn repair_json_text(text: &str) -> Option<String> {
    let mut cleaned = text.trim();
    cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

/// 逐题正则抽取
///
/// 未匹配到的题目填空字符串，但迭代顺序里的第一个题目例外：
/// 它的 explanation 保留完整原始文本，保证失败至少留下一份可人工复查的痕迹。
fn extract_per_question(text: &str, expected_ids: &[String]) -> ParsedAnswerMap {
    let mut answers = ParsedAnswerMap::new();
    let mut matched = 0usize;

    for (idx, id) in expected_ids.iter().enumerate() {
        // 形如 "q1": { "answer": "...", "explanation": "..." }，容忍空白和单双引号
        let pattern = format!(
            r#"(?s)["']?{}["']?\s*:\s*\{{\s*["']?answer["']?\s*:\s*["'](.*?)["']\s*,\s*["']?explanation["']?\s*:\s*["'](.*?)["']\s*\}}"#,
            regex::escape(id)
        );

        let record = match Regex::new(&pattern).ok().and_then(|re| re.captures(text)) {
            Some(caps) => {
                matched += 1;
                AnswerRecord {
                    answer: caps[1].trim().to_string(),
                    explanation: caps[2].trim().to_string(),
                }
            }
            None => {
                warn!("未能在响应中匹配到题目 {}", id);
                if idx == 0 {
                    AnswerRecord {
                        answer: String::new(),
                        explanation: text.to_string(),
                    }
                } else {
                    AnswerRecord::default()
                }
            }
        };
        answers.insert(id.clone(), record);
    }

    if matched == 0 {
        warn!("⚠️ 正则抽取没有匹配到任何题目。原始输出: {}", text);
    }

    answers
}

/// 恢复单题输出（蒸馏路径：响应是顶层 {answer, explanation} 对象）
///
/// 与组恢复走同样的阶梯：直接解析 → 修复重试 → 正则抽取。
/// 连 answer 字段都抽不出来时返回 None，由调用方按单题失败处理。
pub fn recover_single(raw: &RawModelOutput) -> Option<(AnswerRecord, Option<String>)> {
    let reasoning = raw.reasoning().map(|s| s.to_string());
    let content = raw.content();

    if let Some(record) = try_single_parse(content) {
        return Some((record, reasoning));
    }
    if let Some(repaired) = repair_json_text(content) {
        if let Some(record) = try_single_parse(&repaired) {
            return Some((record, reasoning));
        }
    }

    // 正则兜底：分别抽 answer 和 explanation
    let answer_re = Regex::new(r#"(?s)["']?answer["']?\s*:\s*["'](.*?)["']\s*[,}]"#).ok()?;
    let answer = answer_re.captures(content)?[1].trim().to_string();
    let explanation = Regex::new(r#"(?s)["']?explanation["']?\s*:\s*["'](.*?)["']\s*[,}]"#)
        .ok()
        .and_then(|re| re.captures(content).map(|caps| caps[1].trim().to_string()))
        .unwrap_or_default();

    Some((
        AnswerRecord {
            answer,
            explanation,
        },
        reasoning,
    ))
}

fn try_single_parse(text: &str) -> Option<AnswerRecord> {
    let value: JsonValue = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;
    let answer = value_to_text(object.get("answer")?);
    let explanation = object
        .get("explanation")
        .map(value_to_text)
        .unwrap_or_default();
    Some(AnswerRecord {
        answer,
        explanation,
    })
}

/// 把 JSON 值转成文本（答案始终按文本携带）
fn value_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// 从自由文本答案里抽取选择题选项标号
///
/// 先按标号（空格分隔）匹配，再按选项内容子串匹配。
/// 多个候选取最后出现的那个，都匹配不到返回空字符串，不做随机兜底。
pub fn extract_choice(response: &str, options: &FormattedOptions) -> String {
    let mut trimmed = response.trim().to_string();
    for ch in [',', '.', '!', '?', ';', ':', '\''] {
        trimmed = trimmed.trim_matches(ch).trim().to_string();
    }
    // 两侧补空格，避免部分匹配（"B" 匹配进 "Barbell"）
    let padded = format!(" {} ", trimmed);

    // 候选：(标号, 最后出现位置)
    let mut candidates: Vec<(String, usize)> = Vec::new();
    for label in &options.labels {
        if let Some(idx) = padded.rfind(&format!(" {} ", label)) {
            candidates.push((label.clone(), idx));
        }
    }

    if candidates.is_empty() && !trimmed.is_empty() {
        let lowered = padded.to_lowercase();
        for (label, content) in &options.entries {
            let needle = content.trim().to_lowercase();
            if needle.is_empty() {
                continue;
            }
            if let Some(idx) = lowered.rfind(&needle) {
                candidates.push((label.clone(), idx));
            }
        }
    }

    candidates
        .into_iter()
        .max_by_key(|(_, idx)| *idx)
        .map(|(label, _)| label)
        .unwrap_or_default()
}
