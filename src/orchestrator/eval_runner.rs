//! 评测 runner - 编排层
//!
//! ## 职责
//!
//! 用裁判模型逐题判卷：读入生成 runner 的结果文件，
//! 对每个子题构造判卷提示词，按批调度后端，
//! 最后汇总按语言分组的准确率。
//!
//! 工作单元粒度是"一个子题一次后端调用"。
//!
//! 结果文件名带时间戳（每次评测是独立的一次运行），
//! 因此断点续跑只在同一文件内生效。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, DataError};
use crate::infrastructure::UnitExecutor;
use crate::models::loaders::load_dataset;
use crate::services::backend::{GenerationBackend, WorkItem};
use crate::services::fingerprint_cache::FingerprintCache;
use crate::services::prompt::{format_options, JudgePrompt};
use crate::services::recovery::extract_choice;
use crate::services::result_store::ResultStore;
use crate::utils::logging;

use super::RunSummary;

/// 一个待判卷的子题
struct JudgeUnit {
    question_id: String,
    row: JsonValue,
    /// 选择题从自由文本里抽出的选项标号（空串表示没抽出来）
    extracted_choice: Option<String>,
}

/// 评测 runner
pub struct EvaluationRunner {
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    store: ResultStore,
    cache: Arc<Mutex<FingerprintCache>>,
    executor: UnitExecutor,
    /// 待判卷的子题，(question_id, 带模型答案的行)
    rows: Vec<(String, JsonValue)>,
    /// question_id → 标准答案（gold_dir 提供时覆盖行内的 answers 列）
    gold: HashMap<String, String>,
}

impl EvaluationRunner {
    /// 装配一次评测运行
    ///
    /// `data.data_dir` 指向生成 runner 的结果文件
    /// （组键 → {question_id → 行} 的两层映射）。
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>) -> AppResult<Self> {
        let rows = load_answer_store(&config.data.data_dir)?;

        // gold_dir 是可选的标准答案来源；缺省时用行内保留的 answers 列
        let gold = match &config.data.gold_dir {
            Some(gold_dir) => load_dataset(gold_dir)?
                .into_iter()
                .filter_map(|r| r.answers.clone().map(|a| (r.question_id, a)))
                .collect(),
            None => HashMap::new(),
        };

        let store_name = format!(
            "{}_eval_{}",
            backend.model_repr(),
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let store = ResultStore::open(&config.run.output_dir, &store_name)?;

        let cache = if config.run.use_cache {
            FingerprintCache::open(
                &config.run.cache_dir,
                backend.model_repr(),
                1,
                config.generation.temperature,
            )
        } else {
            FingerprintCache::disabled()
        };

        // 判卷始终只要一条补全
        let executor = UnitExecutor::new(config.run.num_workers, 1);

        Ok(Self {
            config,
            backend,
            store,
            cache: Arc::new(Mutex::new(cache)),
            executor,
            rows,
            gold,
        })
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        logging::log_startup(
            "evaluation",
            self.backend.model_repr(),
            self.config.run.num_workers,
        );

        let mut summary = RunSummary::default();

        let pending: Vec<&(String, JsonValue)> = self
            .rows
            .iter()
            .filter(|(question_id, _)| {
                if self.store.exists(question_id) {
                    summary.skipped += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        let batch_size = self.config.run.cache_batch_size.max(1);
        let total_batches = pending.len().div_ceil(batch_size);
        logging::log_workload(self.rows.len(), summary.skipped, batch_size);

        for (batch_num, batch) in pending.chunks(batch_size).enumerate() {
            logging::log_batch_start(batch_num + 1, total_batches, batch.len());

            let mut units: Vec<JudgeUnit> = Vec::with_capacity(batch.len());
            let mut items: Vec<WorkItem> = Vec::with_capacity(batch.len());
            for (question_id, row) in batch {
                let (unit, item) = self.judge_unit(question_id, row);
                units.push(unit);
                items.push(item);
            }

            let worker = super::cached_worker(Arc::clone(&self.backend), Arc::clone(&self.cache));
            let results = self.executor.run(items, worker).await?;

            for (unit, completions) in units.into_iter().zip(results) {
                let response = completions.into_iter().next().unwrap_or_default();
                if response.is_empty() {
                    error!("❌ 题目 {} 判卷失败, 留待下次重跑", unit.question_id);
                    summary.errored += 1;
                    continue;
                }

                let verdict = parse_verdict(&response);
                let mut record = unit.row;
                record["judge_response"] = JsonValue::String(response);
                record["is_correct_by_model"] = match verdict {
                    Some(correct) => JsonValue::Bool(correct),
                    None => JsonValue::Null,
                };
                if let Some(choice) = unit.extracted_choice {
                    record["extracted_choice"] = JsonValue::String(choice);
                }

                self.store.write(&unit.question_id, record)?;
                summary.processed += 1;
            }

            self.cache.lock().await.flush();
        }

        self.log_accuracy();
        logging::print_final_stats(&summary, &self.store.path().display().to_string());
        Ok(summary)
    }

    /// 组装一个子题的判卷单元
    ///
    /// 选择题先做一遍选项抽取：模型的自由文本答案里能定位到
    /// 选项标号时，用标号参与判卷，抽不出来就用原文。
    fn judge_unit(&self, question_id: &str, row: &JsonValue) -> (JudgeUnit, WorkItem) {
        let text = |key: &str| row.get(key).and_then(|v| v.as_str()).unwrap_or("");

        let model_answer = text("model_answer");
        let mut effective_answer = model_answer.to_string();
        let mut extracted_choice = None;

        if text("question_type") == "multiple-choice" {
            if let Some(formatted) = row.get("options").and_then(format_options) {
                let choice = extract_choice(model_answer, &formatted);
                if !choice.is_empty() {
                    effective_answer = choice.clone();
                }
                extracted_choice = Some(choice);
            }
        }

        let gold = self
            .gold
            .get(question_id)
            .map(String::as_str)
            .unwrap_or_else(|| text("answers"));

        let prompt = JudgePrompt::format(
            text("context"),
            text("question"),
            &effective_answer,
            text("model_explanation"),
            gold,
        );

        (
            JudgeUnit {
                question_id: question_id.to_string(),
                row: row.clone(),
                extracted_choice,
            },
            WorkItem::new(prompt, Vec::new(), 1),
        )
    }

    /// 按语言汇总准确率（'unable to answer' 不计入分母）
    fn log_accuracy(&self) {
        let mut per_language: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut overall = (0usize, 0usize);

        for (_question_id, record) in self.store.iter() {
            let Some(JsonValue::Bool(correct)) = record.get("is_correct_by_model") else {
                continue;
            };
            let language = record
                .get("language")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();

            let entry = per_language.entry(language).or_default();
            entry.1 += 1;
            overall.1 += 1;
            if *correct {
                entry.0 += 1;
                overall.0 += 1;
            }
        }

        if overall.1 == 0 {
            warn!("⚠️ 没有任何可统计的判卷结果");
            return;
        }

        info!("\n{}", "─".repeat(60));
        info!("📈 准确率统计");
        for (language, (correct, judged)) in &per_language {
            info!(
                "  {}: {}/{} = {:.1}%",
                language,
                correct,
                judged,
                *correct as f64 / *judged as f64 * 100.0
            );
        }
        info!(
            "  overall: {}/{} = {:.1}%",
            overall.0,
            overall.1,
            overall.0 as f64 / overall.1 as f64 * 100.0
        );
        info!("{}", "─".repeat(60));
    }
}

/// 读入生成 runner 的结果文件并摊平成 (question_id, 行) 列表
fn load_answer_store(path: &str) -> Result<Vec<(String, JsonValue)>, DataError> {
    let content = std::fs::read_to_string(path).map_err(|e| DataError::ReadFailed {
        path: path.to_string(),
        source: e,
    })?;

    let groups: BTreeMap<String, JsonValue> =
        serde_json::from_str(&content).map_err(|e| DataError::JsonParseFailed {
            path: path.to_string(),
            source: e,
        })?;

    let mut rows = Vec::new();
    for (_group_key, group_record) in groups {
        if let JsonValue::Object(map) = group_record {
            for (question_id, row) in map {
                rows.push((question_id, row));
            }
        }
    }

    info!("✓ 模型答案载入: {} 个子题 ({})", rows.len(), path);
    Ok(rows)
}

/// 解析判卷结论
///
/// 'unable to answer' 要在 'correct'/'incorrect' 之前判，
/// 'incorrect' 又必须在 'correct' 之前判（后者是前者的子串）。
fn parse_verdict(response: &str) -> Option<bool> {
    let lower = response.to_lowercase();
    if lower.contains("unable to answer") {
        None
    } else if lower.contains("incorrect") {
        Some(false)
    } else if lower.contains("correct") {
        Some(true)
    } else {
        None
    }
}
