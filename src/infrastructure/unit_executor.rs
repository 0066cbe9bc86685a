//! 工作单元执行器 - 基础设施层
//!
//! ## 职责
//!
//! 给定一批相互独立的工作项和一个"处理单项"的函数，
//! 顺序执行或在有界并发池里扇出执行。
//!
//! ## 不变量
//!
//! - 输出顺序永远等于输入顺序，与完成顺序无关
//! - 单项失败不影响兄弟项：失败位置填入 n 个空字符串的占位结果
//! - 成功结果必须恰好 n 条，否则说明后端违约，整个运行立即失败
//!   （这是唯一不降级为占位结果的检查）

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::error;

use crate::error::BackendError;

/// 工作单元执行器
pub struct UnitExecutor {
    /// 并发度；<= 1 时严格按输入顺序同步执行
    concurrency: usize,
    /// 每个工作项期望的补全条数 N
    n: usize,
}

impl UnitExecutor {
    pub fn new(concurrency: usize, n: usize) -> Self {
        Self { concurrency, n }
    }

    /// 执行一批工作项，返回与输入同序的结果
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, worker_fn: F) -> Result<Vec<Vec<String>>>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<Vec<String>>> + Send + 'static,
    {
        if self.concurrency <= 1 {
            return self.run_sequential(items, worker_fn).await;
        }
        self.run_parallel(items, worker_fn).await
    }

    /// 顺序执行（参考语义）
    async fn run_sequential<T, F, Fut>(
        &self,
        items: Vec<T>,
        worker_fn: F,
    ) -> Result<Vec<Vec<String>>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        let mut results = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let result = worker_fn(item).await;
            results.push(self.settle(index, result)?);
        }
        Ok(results)
    }

    /// 并发执行：提交受信号量约束，结果按原始下标重新归位
    async fn run_parallel<T, F, Fut>(
        &self,
        items: Vec<T>,
        worker_fn: F,
    ) -> Result<Vec<Vec<String>>>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<Vec<String>>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let permit = semaphore.clone().acquire_owned().await?;
            let fut = worker_fn(item);
            let handle = tokio::spawn(async move {
                let _permit = permit;
                fut.await
            });
            handles.push(handle);
        }

        // 按提交顺序收集，天然保证输出顺序 == 输入顺序
        let outcomes = futures::future::join_all(handles).await;
        let mut results = Vec::with_capacity(outcomes.len());
        for (index, outcome) in outcomes.into_iter().enumerate() {
            let result = match outcome {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("任务执行失败: {}", e)),
            };
            results.push(self.settle(index, result)?);
        }
        Ok(results)
    }

    /// 归位单项结果：失败降级为占位结果，补全条数违约则向上失败
    fn settle(&self, index: usize, result: Result<Vec<String>>) -> Result<Vec<String>> {
        match result {
            Ok(completions) => {
                if completions.len() != self.n {
                    return Err(BackendError::WrongCompletionCount {
                        expected: self.n,
                        found: completions.len(),
                    })
                    .with_context(|| format!("工作项 {}", index));
                }
                Ok(completions)
            }
            Err(e) => {
                error!("❌ 工作项 {} 处理失败: {:#}", index, e);
                Ok(vec![String::new(); self.n])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_output_order_equals_input_order() {
        let executor = UnitExecutor::new(8, 1);
        let items: Vec<usize> = (0..50).collect();

        // 人为制造乱序完成：不同项睡不同时长
        let results = executor
            .run(items, |i| async move {
                tokio::time::sleep(Duration::from_millis((i * 7 % 5) as u64)).await;
                Ok(vec![format!("item-{}", i)])
            })
            .await
            .unwrap();

        for (i, result) in results.iter().enumerate() {
            assert_eq!(result, &vec![format!("item-{}", i)]);
        }
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let executor = UnitExecutor::new(4, 3);
        let items: Vec<usize> = (0..20).collect();

        let results = executor
            .run(items, |i| async move {
                if i == 10 {
                    anyhow::bail!("模拟后端故障");
                }
                Ok(vec![format!("a{}", i), format!("b{}", i), format!("c{}", i)])
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        // 失败项是 n 个空字符串的占位结果
        assert_eq!(results[10], vec!["", "", ""]);
        // 兄弟项不受影响
        assert_eq!(results[9], vec!["a9", "b9", "c9"]);
        assert_eq!(results[11], vec!["a11", "b11", "c11"]);
    }

    #[tokio::test]
    async fn test_wrong_completion_count_fails_loudly() {
        let executor = UnitExecutor::new(1, 3);
        let result = executor
            .run(vec![0usize], |_| async move { Ok(vec!["only one".to_string()]) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sequential_matches_parallel() {
        let items: Vec<usize> = (0..10).collect();
        let worker = |i: usize| async move { Ok(vec![i.to_string()]) };

        let sequential = UnitExecutor::new(1, 1)
            .run(items.clone(), worker)
            .await
            .unwrap();
        let parallel = UnitExecutor::new(4, 1).run(items, worker).await.unwrap();

        assert_eq!(sequential, parallel);
    }
}
