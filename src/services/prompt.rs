//! 提示词模板 - 业务能力层
//!
//! 三个 runner 各一个模板，加上选择题选项的标号格式化。
//! 模板本身是英文的（基准数据集的工作语言），与题目语言无关。

use serde_json::{json, Value as JsonValue};

/// 标号后的选择题选项
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedOptions {
    /// 选项标号，A、B、C ...
    pub labels: Vec<String>,
    /// 标号 → 选项内容，顺序与 labels 一致
    pub entries: Vec<(String, String)>,
    /// 渲染成 "A: xxx\nB: yyy" 的文本
    pub rendered: String,
}

/// 解析并标号选项列表
///
/// 选项列可能是 JSON 数组，也可能是字符串化的列表（历史数据格式），
/// 都解析不出来时返回 None，由调用方决定是否把原值透传进提示词。
pub fn format_options(options: &JsonValue) -> Option<FormattedOptions> {
    let items: Vec<String> = match options {
        JsonValue::Array(values) => values
            .iter()
            .map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        JsonValue::String(text) => {
            let trimmed = text.trim().replace('\n', " ");
            // 先按 JSON 解析，失败再把单引号换成双引号重试
            serde_json::from_str::<Vec<String>>(&trimmed)
                .or_else(|_| serde_json::from_str::<Vec<String>>(&trimmed.replace('\'', "\"")))
                .ok()?
        }
        _ => return None,
    };

    if items.is_empty() {
        return None;
    }

    let labels: Vec<String> = (0..items.len())
        .map(|i| char::from(b'A' + i as u8).to_string())
        .collect();
    let entries: Vec<(String, String)> = labels
        .iter()
        .cloned()
        .zip(items.iter().cloned())
        .collect();
    let rendered = entries
        .iter()
        .map(|(label, option)| format!("{}: {}", label, option))
        .collect::<Vec<_>>()
        .join("\n");

    Some(FormattedOptions {
        labels,
        entries,
        rendered,
    })
}

/// 一组子题的生成提示词
pub struct QuestionPrompt;

impl QuestionPrompt {
    /// 组装一个组的完整提示词
    ///
    /// `sub_questions` 是每个子题的 {id, type, question, options?} 对象，
    /// 顺序即子题顺序。
    pub fn format(context: &str, sub_questions: &[JsonValue]) -> String {
        let questions_block = serde_json::to_string_pretty(&json!(sub_questions))
            .unwrap_or_default();

        format!(
            r#"You are a highly knowledgeable financial expert. Please answer the questions in the finance domain. You are given context, images, questions and options.
The questions are multilingual (either in English, Chinese, or French) and multimodal (containing images as part of the question).

Question Format:
- Context: The given financial context.
- Sub-Questions: A series of related sub-questions tied to the same context and images. Later questions may depend on the answers to earlier ones. Each sub-question has a separate question type (multiple-choice or open-ended), indicated at the beginning of the sub-question.
- Images: Image placeholders like '<image_1>', '<image_2>' refer to accompanying images. If images are mentioned, they will be included alongside the textual context. If no images are provided, answer based solely on the textual context.

Answering Guidelines:
For each sub-question, provide:
- Answer:
    For multiple-choice questions, return the option index.
    For open-ended questions, provide a concise and precise answer.
- Explanation: Provide a clear and detailed explanation (maximum 200 words) for your answer in the same language as the question.

Now consider the following question:
context: {context}
{questions_block}

Your response must be in a standard JSON format mapping each sub-question id to an object with "answer" and "explanation" fields:
```json
{{
"<sub-question-id-1>": {{
    "answer": "<answer-1>",
    "explanation": "<explanation-1>"
}},
"<sub-question-id-2>": {{
    "answer": "<answer-2>",
    "explanation": "<explanation-2>"
}}
}}
```
Ensure that the response strictly adheres to JSON syntax without any additional content.
"#
        )
    }
}

/// 评测（判卷）提示词
pub struct JudgePrompt;

impl JudgePrompt {
    pub fn format(
        context: &str,
        question: &str,
        model_answer: &str,
        model_explanation: &str,
        answer: &str,
    ) -> String {
        format!(
            r#"You are a highly knowledgeable expert and teacher in the finance domain.
You are reviewing a student's answers to financial questions.
The questions are multilingual (either in English, Chinese, or French) and multimodal (containing images as part of the question). '<image_1>, <image_2> ...' mentioned in the text of the context or question are sequential placeholders for images, which are fed at the same time as the textual information.
You are given the context, the question, the student's answer and the student's explanation and the ground-truth answer.
Please use the given information and refer to the ground-truth answer to determine if the student's answer is correct.

The input information is as follows:

context: {context}
question: {question}
student's answer: {model_answer}
student's explanation: {model_explanation}
ground-truth answer: {answer}

If the student's answer is empty or completely nonsensical, please respond with 'unable to answer'.
In other cases, please respond directly as either 'correct' or 'incorrect'.
"#
        )
    }
}

/// 推理蒸馏提示词（单个子题）
pub struct ReasoningDistillationPrompt;

impl ReasoningDistillationPrompt {
    pub fn format(context: &str, question: &JsonValue) -> String {
        let question_block = serde_json::to_string_pretty(question).unwrap_or_default();

        format!(
            r#"You are a highly knowledgeable financial expert. Please answer the question in the finance domain, thinking through the problem step by step before giving the final answer.
The question is multilingual (either in English, Chinese, or French). Image placeholders like '<image_1>' refer to accompanying material already transcribed into the context.

context: {context}
question: {question_block}

First reason carefully through the problem. Then give your final response in a standard JSON format:
```json
{{
"answer": "<your final answer>",
"explanation": "<a concise explanation of your answer, maximum 200 words, in the same language as the question>"
}}
```
Ensure that the final JSON strictly adheres to JSON syntax without any additional content.
"#
        )
    }
}
