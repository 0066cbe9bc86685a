//! 问题组处理流程 - 流程层
//!
//! 核心职责：定义"一个组"的完整处理流程
//!
//! 流程顺序（组级状态机）：
//! PENDING → PROMPTED → RECOVERED → MERGED → PERSISTED
//!
//! 任何一步失败进入 ERRORED，该组留在 PENDING 等下次重跑，
//! 不中止整个批次。没有单步自动重试：唯一的重试机制是整体重跑，
//! 由结果存储的幂等跳过保证安全。

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value as JsonValue};
use tracing::debug;

use crate::models::group::QuestionGroup;
use crate::models::record::QuestionRecord;
use crate::services::backend::{BackendCapability, RawModelOutput, WorkItem};
use crate::services::images::collect_group_images;
use crate::services::prompt::{format_options, QuestionPrompt};
use crate::services::recovery::{recover, Recovered};

/// 把一个子题渲染成提示词里的 {id, type, question, options?} 对象
///
/// 选择题选项能标号就标号（A: / B: / C:），标不了就透传原值。
pub fn question_entry(row: &QuestionRecord) -> JsonValue {
    let mut question = json!({
        "id": row.question_id,
        "type": row.question_type,
        "question": row.question,
    });
    if row.question_type == "multiple-choice" {
        if let Some(options) = &row.options {
            question["options"] = match format_options(options) {
                Some(formatted) => JsonValue::String(formatted.rendered),
                None => options.clone(),
            };
        }
    }
    question
}

/// 组级状态（只用于日志与统计，不持久化）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Pending,
    Prompted,
    Recovered,
    Merged,
    Persisted,
    Errored,
}

/// 问题组处理流程
///
/// - 编排一个组的 prompt 组装、图片收集、恢复与合并
/// - 不持有后端连接，不做调度
pub struct GroupFlow {
    /// 数据集所在目录（图片相对路径的根）
    parent_dir: String,
    /// 后端能力标签，决定图片的编码方式与是否拆推理痕迹
    capability: BackendCapability,
    /// 每个请求的补全条数
    n: usize,
}

impl GroupFlow {
    pub fn new(parent_dir: String, capability: BackendCapability, n: usize) -> Self {
        Self {
            parent_dir,
            capability,
            n,
        }
    }

    /// PENDING → PROMPTED 的准备工作：组装 WorkItem
    pub fn prepare(&self, group: &QuestionGroup) -> Result<WorkItem> {
        let sub_questions: Vec<JsonValue> = group.rows.iter().map(question_entry).collect();

        let prompt = QuestionPrompt::format(group.context(), &sub_questions);
        let images = collect_group_images(group, &self.parent_dir, self.capability)?;

        debug!(
            "组 {} {:?} → {:?}: {} 个子题, {} 张图片",
            group.key(),
            GroupState::Pending,
            GroupState::Prompted,
            sub_questions.len(),
            images.len()
        );

        Ok(WorkItem::new(prompt, images, self.n))
    }

    /// PROMPTED → RECOVERED：把第一条补全恢复成结构化答案
    pub fn recover_completion(&self, completion: &str, group: &QuestionGroup) -> Recovered {
        let raw = match self.capability {
            BackendCapability::Reasoning => RawModelOutput::from_tagged(completion),
            _ => RawModelOutput::Plain(completion.to_string()),
        };
        debug!(
            "组 {} {:?} → {:?}",
            group.key(),
            GroupState::Prompted,
            GroupState::Recovered
        );
        recover(&raw, &group.question_ids())
    }

    /// RECOVERED → MERGED：把恢复结果折回原始行，得到整组的存储记录
    ///
    /// 记录形如 { question_id → 原始行 + model_answer / model_explanation
    /// (+ model_reasoning) }。Failed 视为该组失败。
    pub fn merge(&self, group: &QuestionGroup, recovered: &Recovered) -> Result<JsonValue> {
        let answers = recovered
            .answers()
            .ok_or_else(|| anyhow!("组 {} 的响应无法恢复出任何答案", group.key()))?;

        let mut record = Map::new();
        for row in &group.rows {
            let answer = answers
                .get(&row.question_id)
                .ok_or_else(|| anyhow!("恢复结果缺少题目 {}", row.question_id))?;

            let mut merged = row.to_json();
            merged["model_answer"] = JsonValue::String(answer.answer.clone());
            merged["model_explanation"] = JsonValue::String(answer.explanation.clone());
            if let Some(reasoning) = recovered.reasoning() {
                merged["model_reasoning"] = JsonValue::String(reasoning.to_string());
            }
            record.insert(row.question_id.clone(), merged);
        }

        debug!(
            "组 {} {:?} → {:?}",
            group.key(),
            GroupState::Recovered,
            GroupState::Merged
        );
        Ok(JsonValue::Object(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::QuestionRecord;

    fn sample_group() -> QuestionGroup {
        let rows: Vec<QuestionRecord> = vec![
            serde_json::from_value(json!({
                "question_id": "english_1_1_r1",
                "context": "bond context",
                "question": "Which strategy?",
                "question_type": "multiple-choice",
                "options": ["Bullet", "Barbell"],
                "language": "english",
                "main_question_id": 1,
                "sub_question_id": 1,
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "question_id": "english_1_2_r1",
                "question": "Explain why.",
                "question_type": "open-ended",
                "language": "english",
                "main_question_id": 1,
                "sub_question_id": 2,
            }))
            .unwrap(),
        ];
        QuestionGroup {
            language: "english".to_string(),
            main_question_id: 1,
            rows,
        }
    }

    fn flow() -> GroupFlow {
        GroupFlow::new(".".to_string(), BackendCapability::Vision, 1)
    }

    #[test]
    fn test_prepare_builds_prompt_with_labelled_options() {
        let item = flow().prepare(&sample_group()).unwrap();
        assert!(item.prompt.contains("bond context"));
        assert!(item.prompt.contains("A: Bullet"));
        assert!(item.prompt.contains("english_1_2_r1"));
        assert_eq!(item.n, 1);
        assert!(item.images.is_empty());
    }

    #[test]
    fn test_merge_folds_answers_into_rows() {
        let group = sample_group();
        let recovered = flow().recover_completion(
            r#"{"english_1_1_r1": {"answer": "A", "explanation": "x"},
                "english_1_2_r1": {"answer": "duration", "explanation": "y"}}"#,
            &group,
        );
        let record = flow().merge(&group, &recovered).unwrap();

        assert_eq!(record["english_1_1_r1"]["model_answer"], "A");
        assert_eq!(record["english_1_1_r1"]["question_type"], "multiple-choice");
        assert_eq!(record["english_1_2_r1"]["model_answer"], "duration");
        assert_eq!(record["english_1_2_r1"]["model_explanation"], "y");
    }

    #[test]
    fn test_merge_attaches_reasoning() {
        let group = sample_group();
        let flow = GroupFlow::new(".".to_string(), BackendCapability::Reasoning, 1);
        let recovered = flow.recover_completion(
            r#"{"english_1_1_r1": {"answer": "A", "explanation": "x"},
                "english_1_2_r1": {"answer": "d", "explanation": "y"}}<reason>chain</reason>"#,
            &group,
        );
        let record = flow.merge(&group, &recovered).unwrap();
        assert_eq!(record["english_1_1_r1"]["model_reasoning"], "chain");
    }

    #[test]
    fn test_merge_failed_recovery_is_error() {
        let group = sample_group();
        assert!(flow().merge(&group, &Recovered::Failed).is_err());
    }
}
