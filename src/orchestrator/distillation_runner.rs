//! 推理蒸馏 runner - 编排层
//!
//! ## 职责
//!
//! 逐子题收集带推理痕迹的回答：每个子题一条蒸馏提示词，
//! 工作项以 question_id 为身份键，按批调度后端，
//! 回答与推理痕迹一起合入原始行落盘。
//!
//! 蒸馏是纯文本流程：图片内容默认已转写进上下文。

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, DataError};
use crate::infrastructure::UnitExecutor;
use crate::models::language::language_order;
use crate::models::loaders::load_dataset;
use crate::models::record::QuestionRecord;
use crate::services::backend::{BackendCapability, GenerationBackend, RawModelOutput, WorkItem};
use crate::services::fingerprint_cache::FingerprintCache;
use crate::services::prompt::ReasoningDistillationPrompt;
use crate::services::recovery::recover_single;
use crate::services::result_store::ResultStore;
use crate::utils::logging;
use crate::workflow::question_entry;

use super::RunSummary;

/// 推理蒸馏 runner
pub struct DistillationRunner {
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    store: ResultStore,
    cache: Arc<Mutex<FingerprintCache>>,
    executor: UnitExecutor,
    rows: Vec<QuestionRecord>,
}

impl DistillationRunner {
    /// 装配一次蒸馏运行
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>) -> AppResult<Self> {
        let mut rows = load_dataset(&config.data.data_dir)?;

        for row in &rows {
            if language_order(&row.language).is_none() {
                return Err(DataError::UnknownLanguage {
                    language: row.language.clone(),
                }
                .into());
            }
        }
        rows.sort_by_key(|r| {
            (
                language_order(&r.language).unwrap_or(u32::MAX),
                r.main_question_id,
                r.sub_question_id,
            )
        });

        // 指定题目列表时只蒸馏这些题
        if let Some(question_ids) = &config.data.question_ids {
            let wanted: HashSet<&str> = question_ids.iter().map(String::as_str).collect();
            rows.retain(|r| wanted.contains(r.question_id.as_str()));
            info!("📌 只处理指定的 {} 个题目", rows.len());
        }

        let store_name = format!(
            "{}_distill_{}",
            backend.model_repr(),
            config.data.release_version()
        );
        let store = ResultStore::open(&config.run.output_dir, &store_name)?;

        let cache = if config.run.use_cache {
            FingerprintCache::open(
                &config.run.cache_dir,
                backend.model_repr(),
                config.generation.n,
                config.generation.temperature,
            )
        } else {
            FingerprintCache::disabled()
        };

        let executor = UnitExecutor::new(config.run.num_workers, config.generation.n);

        Ok(Self {
            config,
            backend,
            store,
            cache: Arc::new(Mutex::new(cache)),
            executor,
            rows,
        })
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        logging::log_startup(
            "distillation",
            self.backend.model_repr(),
            self.config.run.num_workers,
        );

        let mut summary = RunSummary::default();

        let pending: Vec<&QuestionRecord> = self
            .rows
            .iter()
            .filter(|row| {
                if self.store.exists(&row.question_id) {
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

            let items: Vec<WorkItem> = batch
                .iter()
                .map(|row| {
                    let prompt =
                        ReasoningDistillationPrompt::format(&row.context, &question_entry(row));
                    WorkItem::keyed(row.question_id.clone(), prompt, self.config.generation.n)
                })
                .collect();

            let worker = super::cached_worker(Arc::clone(&self.backend), Arc::clone(&self.cache));
            let results = self.executor.run(items, worker).await?;

            for (&row, completions) in batch.iter().zip(results) {
                let response = completions.into_iter().next().unwrap_or_default();
                if response.is_empty() {
                    error!("❌ 题目 {} 蒸馏失败, 留待下次重跑", row.question_id);
                    summary.errored += 1;
                    continue;
                }

                let raw = match self.backend.capability() {
                    BackendCapability::Reasoning => RawModelOutput::from_tagged(&response),
                    _ => RawModelOutput::Plain(response.clone()),
                };

                let Some((answer, reasoning)) = recover_single(&raw) else {
                    warn!(
                        "⚠️ 题目 {} 的响应无法恢复: {}",
                        row.question_id,
                        logging::truncate_text(raw.content(), 200)
                    );
                    summary.errored += 1;
                    continue;
                };

                let mut record = row.to_json();
                record["model_answer"] = JsonValue::String(answer.answer);
                record["model_explanation"] = JsonValue::String(answer.explanation);
                if let Some(reasoning) = reasoning {
                    record["model_reasoning"] = JsonValue::String(reasoning);
                }

                self.store.write(&row.question_id, record)?;
                info!("✓ 题目 {} 已写入", row.question_id);
                summary.processed += 1;
            }

            self.cache.lock().await.flush();
        }

        logging::print_final_stats(&summary, &self.store.path().display().to_string());
        Ok(summary)
    }
}
