//! 问题组模型
//!
//! 一个组 = 一个主题及其全部子题，共享上下文和图片，
//! 是后端调用的原子单位。

use crate::models::record::QuestionRecord;

/// 问题组
///
/// 组内子题已按 sub_question_id 升序排好，
/// 上下文和图片只取第一个子题的（排序错误会静默丢失上下文，
/// 所以排序由 grouper 统一保证并校验）。
#[derive(Debug, Clone)]
pub struct QuestionGroup {
    pub language: String,
    pub main_question_id: u32,
    pub rows: Vec<QuestionRecord>,
}

impl QuestionGroup {
    /// 结果存储的键：{language}_{main_question_id}
    pub fn key(&self) -> String {
        format!("{}_{}", self.language, self.main_question_id)
    }

    /// 组内所有子题的 question_id，按子题顺序
    pub fn question_ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.question_id.clone()).collect()
    }

    /// 共享上下文（取第一个子题）
    pub fn context(&self) -> &str {
        self.rows.first().map(|r| r.context.as_str()).unwrap_or("")
    }

    /// 共享图片路径（取第一个子题的 image_1..7）
    pub fn image_paths(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|r| r.image_paths())
            .unwrap_or_default()
    }
}
