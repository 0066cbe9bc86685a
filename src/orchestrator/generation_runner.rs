//! 生成 runner - 编排层
//!
//! ## 职责
//!
//! 管理一次完整的答案生成运行：
//! 数据集 → 问题组 → 跳过已完成 → 按批调度（缓存 + 后端）→
//! 恢复合并 → 逐组落盘。
//!
//! 工作单元粒度是"一个问题组一次后端调用"。

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::UnitExecutor;
use crate::models::group::QuestionGroup;
use crate::models::loaders::{dataset_parent_dir, load_dataset};
use crate::services::backend::{GenerationBackend, WorkItem};
use crate::services::fingerprint_cache::FingerprintCache;
use crate::services::grouper::group_by_language_and_main_id;
use crate::services::recovery::Recovered;
use crate::services::result_store::ResultStore;
use crate::utils::logging;
use crate::workflow::{GroupCtx, GroupFlow, GroupState};

use super::RunSummary;

/// 生成 runner
pub struct GenerationRunner {
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    store: ResultStore,
    cache: Arc<Mutex<FingerprintCache>>,
    flow: GroupFlow,
    executor: UnitExecutor,
    groups: Vec<QuestionGroup>,
}

impl GenerationRunner {
    /// 装配一次生成运行的全部资源
    ///
    /// 数据集校验在这里完成，任何后端调用之前失败。
    pub fn new(config: Config, backend: Arc<dyn GenerationBackend>) -> AppResult<Self> {
        let rows = load_dataset(&config.data.data_dir)?;
        let mut groups = group_by_language_and_main_id(rows)?;

        // 调试用过滤：只跑指定主题号（校验仍针对完整数据集）
        if let Some(main_id) = config.data.main_question_id {
            groups.retain(|g| g.main_question_id == main_id);
            info!("📌 只处理主题号 {}: {} 个组", main_id, groups.len());
        }

        let store_name = format!(
            "{}_ans_{}",
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

        let flow = GroupFlow::new(
            dataset_parent_dir(&config.data.data_dir),
            backend.capability(),
            config.generation.n,
        );
        let executor = UnitExecutor::new(config.run.num_workers, config.generation.n);

        Ok(Self {
            config,
            backend,
            store,
            cache: Arc::new(Mutex::new(cache)),
            flow,
            executor,
            groups,
        })
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        logging::log_startup(
            "generation",
            self.backend.model_repr(),
            self.config.run.num_workers,
        );

        let mut summary = RunSummary::default();

        // 键存在即已完成，跳过是唯一的续跑机制
        let pending: Vec<&QuestionGroup> = self
            .groups
            .iter()
            .filter(|group| {
                if self.store.exists(&group.key()) {
                    debug!("⏭️ 组 {} 已有结果, 跳过", group.key());
                    summary.skipped += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        let batch_size = self.config.run.cache_batch_size.max(1);
        let total_pending = pending.len();
        let total_batches = total_pending.div_ceil(batch_size);
        logging::log_workload(self.groups.len(), summary.skipped, batch_size);

        let mut group_index = 0;
        for (batch_num, batch) in pending.chunks(batch_size).enumerate() {
            logging::log_batch_start(batch_num + 1, total_batches, batch.len());

            // 组装工作项；组装失败（如图片缺失）不进入本批
            let mut prepared: Vec<(GroupCtx, &QuestionGroup)> = Vec::with_capacity(batch.len());
            let mut items: Vec<WorkItem> = Vec::with_capacity(batch.len());
            for &group in batch {
                group_index += 1;
                let ctx = GroupCtx::new(group_index, total_pending, group.key());
                match self.flow.prepare(group) {
                    Ok(item) => {
                        items.push(item);
                        prepared.push((ctx, group));
                    }
                    Err(e) => {
                        error!("{} ❌ 组装失败: {:#}", ctx, e);
                        summary.errored += 1;
                    }
                }
            }

            let worker = super::cached_worker(Arc::clone(&self.backend), Arc::clone(&self.cache));
            let results = self.executor.run(items, worker).await?;

            for ((ctx, group), completions) in prepared.iter().zip(results) {
                // 空字符串是执行器的失败占位（真正的空响应在后端层就是错误）
                if completions.first().map_or(true, |c| c.is_empty()) {
                    error!("{} ❌ 后端调用失败, 组留待下次重跑", ctx);
                    summary.errored += 1;
                    continue;
                }

                // n > 1 时余下的补全只进缓存，恢复始终针对第一条
                let recovered = self.flow.recover_completion(&completions[0], group);
                if let Recovered::Degraded { .. } = &recovered {
                    warn!("{} ⚠️ 结构化解析失败, 使用逐题正则兜底结果", ctx);
                }

                match self.flow.merge(group, &recovered) {
                    Ok(record) => {
                        self.store.write(&group.key(), record)?;
                        info!("{} ✓ {:?}", ctx, GroupState::Persisted);
                        summary.processed += 1;
                    }
                    Err(e) => {
                        error!("{} ❌ {:#} ({:?})", ctx, e, GroupState::Errored);
                        summary.errored += 1;
                    }
                }
            }

            self.cache.lock().await.flush();
        }

        logging::print_final_stats(&summary, &self.store.path().display().to_string());
        Ok(summary)
    }
}
