//! 编排层
//!
//! ## 职责
//!
//! 三个 runner 各自管理一种完整运行（生成 / 评测 / 蒸馏）：
//! 装配资源（后端、缓存、结果存储）、按批调度工作单元、汇总统计。
//!
//! runner 的选择是一张显式的构造函数表（见 [`build_runner`]），
//! 不做运行时注册：新增 runner 就在这里加一个分支。

pub mod distillation_runner;
pub mod eval_runner;
pub mod generation_runner;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppResult, ConfigError};
use crate::services::backend::{GenerationBackend, WorkItem};
use crate::services::fingerprint_cache::FingerprintCache;
use crate::services::openai_backend::OpenAiBackend;

pub use distillation_runner::DistillationRunner;
pub use eval_runner::EvaluationRunner;
pub use generation_runner::GenerationRunner;

/// 一次运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// 本次新完成的工作单元数
    pub processed: usize,
    /// 已有结果、直接跳过的数量
    pub skipped: usize,
    /// 失败（留待下次重跑）的数量
    pub errored: usize,
}

/// 可运行的 runner
pub enum Runner {
    Generation(GenerationRunner),
    Evaluation(EvaluationRunner),
    Distillation(DistillationRunner),
}

impl Runner {
    pub async fn run(&mut self) -> anyhow::Result<RunSummary> {
        match self {
            Runner::Generation(runner) => runner.run().await,
            Runner::Evaluation(runner) => runner.run().await,
            Runner::Distillation(runner) => runner.run().await,
        }
    }
}

/// 三个 runner 共用的工作项处理函数：查缓存 → 未命中则调后端 → 回填缓存
pub(crate) fn cached_worker(
    backend: Arc<dyn GenerationBackend>,
    cache: Arc<Mutex<FingerprintCache>>,
) -> impl Fn(WorkItem) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<String>>> + Send>> {
    move |item: WorkItem| {
        let backend = Arc::clone(&backend);
        let cache = Arc::clone(&cache);
        Box::pin(async move {
            let fingerprint = item.fingerprint();
            if let Some(hit) = cache.lock().await.lookup(&fingerprint, item.n).cloned() {
                debug!("💾 缓存命中, 跳过后端调用");
                return Ok(hit);
            }
            let completions = backend.generate(&item).await?;
            cache.lock().await.store(fingerprint, completions.clone());
            Ok(completions)
        })
    }
}

/// 按名称构造 runner
///
/// 名称 → 构造函数的映射就是这个 match 本身。
/// 未知名称是配置错误，在任何后端调用之前失败。
pub fn build_runner(config: Config) -> AppResult<Runner> {
    let backend: Arc<dyn GenerationBackend> =
        Arc::new(OpenAiBackend::new(&config.model, &config.generation));

    match config.runner_name.as_str() {
        "generation" => Ok(Runner::Generation(GenerationRunner::new(config, backend)?)),
        "evaluation" => Ok(Runner::Evaluation(EvaluationRunner::new(config, backend)?)),
        "distillation" => Ok(Runner::Distillation(DistillationRunner::new(
            config, backend,
        )?)),
        other => Err(ConfigError::UnknownRunner {
            name: other.to_string(),
        }
        .into()),
    }
}
