//! 端到端集成测试
//!
//! 用一个确定性的 mock 后端驱动三个 runner，
//! 覆盖断点续跑、缓存命中、失败隔离这几条核心性质。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value as JsonValue};
use tokio_test::assert_ok;

use batch_answer_gen::config::Config;
use batch_answer_gen::error::BackendError;
use batch_answer_gen::orchestrator::{DistillationRunner, EvaluationRunner, GenerationRunner};
use batch_answer_gen::services::backend::{BackendCapability, GenerationBackend, WorkItem};

/// 确定性 mock 后端
///
/// 从提示词里找出全部子题 id，按响应约定返回合法 JSON；
/// 提示词包含 fail_marker 时模拟后端故障。
struct MockBackend {
    capability: BackendCapability,
    fail_marker: Option<String>,
    calls: AtomicUsize,
    /// 响应里是否附带 `<reason>` 推理痕迹
    with_reasoning: bool,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            capability: BackendCapability::Text,
            fail_marker: None,
            calls: AtomicUsize::new(0),
            with_reasoning: false,
        })
    }

    fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            capability: BackendCapability::Text,
            fail_marker: Some(marker.to_string()),
            calls: AtomicUsize::new(0),
            with_reasoning: false,
        })
    }

    fn reasoning() -> Arc<Self> {
        Arc::new(Self {
            capability: BackendCapability::Reasoning,
            fail_marker: None,
            calls: AtomicUsize::new(0),
            with_reasoning: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn model_repr(&self) -> &str {
        "mock"
    }

    fn capability(&self) -> BackendCapability {
        self.capability
    }

    async fn generate(&self, item: &WorkItem) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_marker {
            if item.prompt.contains(marker) {
                return Err(BackendError::EmptyResponse {
                    model: "mock-model".to_string(),
                });
            }
        }

        // 判卷提示词：按学生答案给结论
        if item.prompt.contains("ground-truth answer:") {
            let verdict = if item.prompt.contains("student's answer: A") {
                "correct"
            } else {
                "incorrect"
            };
            return Ok(vec![verdict.to_string(); item.n]);
        }

        // 蒸馏提示词：单题响应
        if let Some(id) = &item.id {
            let mut response = json!({"answer": "42", "explanation": format!("mock for {}", id)})
                .to_string();
            if self.with_reasoning {
                response.push_str("<reason>step by step</reason>");
            }
            return Ok(vec![response; item.n]);
        }

        // 生成提示词：对提示词里出现的每个子题 id 回一条答案
        let id_re = Regex::new(r#""id": "([a-z]+_\d+_\d+_r\d+)""#).unwrap();
        let mut answers = serde_json::Map::new();
        for caps in id_re.captures_iter(&item.prompt) {
            answers.insert(
                caps[1].to_string(),
                json!({"answer": "A", "explanation": "mock explanation"}),
            );
        }
        Ok(vec![JsonValue::Object(answers).to_string(); item.n])
    }
}

/// 写一个 2 语言 × 若干主题的小数据集，返回数据文件路径
fn write_dataset(dir: &std::path::Path) -> String {
    let rows = json!([
        {
            "question_id": "english_1_1_r1",
            "context": "bond portfolio context",
            "question": "Which strategy?",
            "question_type": "multiple-choice",
            "options": ["Bullet", "Barbell"],
            "answers": "A",
            "language": "english",
            "main_question_id": 1,
            "sub_question_id": 1
        },
        {
            "question_id": "english_1_2_r1",
            "question": "Explain why.",
            "question_type": "open-ended",
            "answers": "duration",
            "language": "english",
            "main_question_id": 1,
            "sub_question_id": 2
        },
        {
            "question_id": "english_2_1_r1",
            "context": "equity valuation context",
            "question": "What is the P/E?",
            "question_type": "open-ended",
            "answers": "12",
            "language": "english",
            "main_question_id": 2,
            "sub_question_id": 1
        },
        {
            "question_id": "chinese_1_1_r1",
            "context": "外汇市场背景",
            "question": "汇率会如何变化?",
            "question_type": "open-ended",
            "answers": "上涨",
            "language": "chinese",
            "main_question_id": 1,
            "sub_question_id": 1
        }
    ]);

    let path = dir.join("release_vtest.json");
    std::fs::write(&path, serde_json::to_string_pretty(&rows).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn test_config(dir: &std::path::Path, runner_name: &str, data_dir: String) -> Config {
    let toml_str = format!(
        r#"
            runner_name = "{runner_name}"

            [model]
            model_name = "mock-model"
            model_repr = "mock"
            api_key = "sk-test"
            capability = "text"

            [data]
            data_dir = {data_dir:?}

            [run]
            num_workers = 4
            cache_dir = {cache_dir:?}
            output_dir = {output_dir:?}
            cache_batch_size = 2
        "#,
        cache_dir = dir.join("cache").to_string_lossy(),
        output_dir = dir.join("output").to_string_lossy(),
    );
    toml::from_str(&toml_str).unwrap()
}

fn read_store(dir: &std::path::Path, name: &str) -> serde_json::Map<String, JsonValue> {
    let content = std::fs::read_to_string(dir.join("output").join(name)).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_generation_end_to_end_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = write_dataset(dir.path());

    let backend = MockBackend::new();
    let config = test_config(dir.path(), "generation", data_dir.clone());
    let mut runner = GenerationRunner::new(config, backend.clone()).unwrap();
    let summary = assert_ok!(runner.run().await);

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.errored, 0);
    assert_eq!(backend.calls(), 3);

    let store = read_store(dir.path(), "mock_ans_release_vtest.json");
    assert_eq!(store.len(), 3);
    let english_1 = &store["english_1"];
    assert_eq!(english_1["english_1_1_r1"]["model_answer"], "A");
    assert_eq!(english_1["english_1_2_r1"]["model_explanation"], "mock explanation");
    // 原始列原样保留
    assert_eq!(english_1["english_1_1_r1"]["answers"], "A");

    // 重跑（模拟进程重启）：全部跳过，后端一次都不调
    let backend2 = MockBackend::new();
    let config = test_config(dir.path(), "generation", data_dir);
    let mut runner = GenerationRunner::new(config, backend2.clone()).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(backend2.calls(), 0);
}

#[tokio::test]
async fn test_generation_cache_replaces_backend_calls() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = write_dataset(dir.path());

    let backend = MockBackend::new();
    let config = test_config(dir.path(), "generation", data_dir.clone());
    let mut runner = GenerationRunner::new(config, backend.clone()).unwrap();
    runner.run().await.unwrap();
    assert_eq!(backend.calls(), 3);

    // 删掉结果文件但保留缓存：重算全靠缓存命中
    std::fs::remove_file(dir.path().join("output/mock_ans_release_vtest.json")).unwrap();

    let backend2 = MockBackend::new();
    let config = test_config(dir.path(), "generation", data_dir);
    let mut runner = GenerationRunner::new(config, backend2.clone()).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(backend2.calls(), 0);
}

#[tokio::test]
async fn test_generation_failure_isolation_and_retry() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = write_dataset(dir.path());

    // chinese_1 组的上下文触发故障，其余组不受影响
    let backend = MockBackend::failing_on("外汇市场背景");
    let mut config = test_config(dir.path(), "generation", data_dir.clone());
    config.run.use_cache = false;
    let mut runner = GenerationRunner::new(config, backend).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errored, 1);

    let store = read_store(dir.path(), "mock_ans_release_vtest.json");
    assert!(store.contains_key("english_1"));
    assert!(store.contains_key("english_2"));
    assert!(!store.contains_key("chinese_1"));

    // 故障恢复后重跑：只补失败的那个组
    let backend = MockBackend::new();
    let mut config = test_config(dir.path(), "generation", data_dir);
    config.run.use_cache = false;
    let mut runner = GenerationRunner::new(config, backend.clone()).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(backend.calls(), 1);

    let store = read_store(dir.path(), "mock_ans_release_vtest.json");
    assert!(store.contains_key("chinese_1"));
}

#[tokio::test]
async fn test_generation_main_question_id_filter() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = write_dataset(dir.path());

    let backend = MockBackend::new();
    let mut config = test_config(dir.path(), "generation", data_dir);
    config.data.main_question_id = Some(2);
    let mut runner = GenerationRunner::new(config, backend).unwrap();
    let summary = runner.run().await.unwrap();

    // 数据集中主题号为 2 的只有 english_2
    assert_eq!(summary.processed, 1);
    let store = read_store(dir.path(), "mock_ans_release_vtest.json");
    assert!(store.contains_key("english_2"));
    assert!(!store.contains_key("english_1"));
}

#[tokio::test]
async fn test_distillation_keeps_reasoning_trace() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = write_dataset(dir.path());

    let backend = MockBackend::reasoning();
    let mut config = test_config(dir.path(), "distillation", data_dir);
    config.data.question_ids = Some(vec![
        "english_1_1_r1".to_string(),
        "chinese_1_1_r1".to_string(),
    ]);
    let mut runner = DistillationRunner::new(config, backend).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 2);

    let store = read_store(dir.path(), "mock_distill_release_vtest.json");
    assert_eq!(store.len(), 2);
    assert_eq!(store["english_1_1_r1"]["model_answer"], "42");
    assert_eq!(store["english_1_1_r1"]["model_reasoning"], "step by step");
    assert_eq!(
        store["chinese_1_1_r1"]["model_explanation"],
        "mock for chinese_1_1_r1"
    );
}

#[tokio::test]
async fn test_evaluation_judges_answer_store() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("output")).unwrap();

    // 手写一个生成结果文件：A 是正确答案, B 会被判错
    let answers = json!({
        "english_1": {
            "english_1_1_r1": {
                "context": "bond portfolio context",
                "question": "Which strategy?",
                "question_type": "multiple-choice",
                "options": ["Bullet", "Barbell"],
                "answers": "A",
                "language": "english",
                "model_answer": "A",
                "model_explanation": "bullet matches the horizon"
            },
            "english_1_2_r1": {
                "question": "Explain why.",
                "question_type": "open-ended",
                "answers": "duration",
                "language": "english",
                "model_answer": "convexity",
                "model_explanation": "wrong concept"
            }
        }
    });
    let answers_path = dir.path().join("mock_ans_release_vtest.json");
    std::fs::write(&answers_path, answers.to_string()).unwrap();

    let backend = MockBackend::new();
    let mut config = test_config(
        dir.path(),
        "evaluation",
        answers_path.to_string_lossy().into_owned(),
    );
    config.run.use_cache = false;
    let mut runner = EvaluationRunner::new(config, backend).unwrap();
    let summary = runner.run().await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.errored, 0);

    // 评测结果文件名带时间戳, 按前缀找
    let eval_file = std::fs::read_dir(dir.path().join("output"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .find(|name| name.starts_with("mock_eval_"))
        .unwrap();
    let store = read_store(dir.path(), &eval_file);

    assert_eq!(store["english_1_1_r1"]["is_correct_by_model"], true);
    assert_eq!(store["english_1_1_r1"]["extracted_choice"], "A");
    assert_eq!(store["english_1_2_r1"]["is_correct_by_model"], false);
}
