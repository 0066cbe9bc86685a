//! 指纹缓存 - 业务能力层
//!
//! ## 职责
//!
//! 把"请求指纹 → n 条补全"整体记住，消除同一次运行内
//! 完全相同请求的重复后端调用（重复调用就是重复计费）。
//!
//! ## 持久化
//!
//! 每个 {模型, n, temperature} 组合一个 JSON 文件，启动时整体载入内存，
//! 每处理完一个批次刷盘一次（而不是每条一刷，控制写放大）。
//! 缓存文件损坏或缺失一律当作空缓存，绝不让运行失败。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// 指纹缓存
pub struct FingerprintCache {
    path: Option<PathBuf>,
    entries: HashMap<String, Vec<String>>,
}

impl FingerprintCache {
    /// 打开（或新建）一个缓存
    ///
    /// 文件路径：{cache_dir}/{model_repr}/{n}_{temperature}.json
    pub fn open(cache_dir: &str, model_repr: &str, n: usize, temperature: f32) -> Self {
        let path = Path::new(cache_dir)
            .join(model_repr)
            .join(format!("{}_{}.json", n, temperature));

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, Vec<String>>>(&content) {
                Ok(entries) => {
                    info!("✓ 缓存加载完成: {} 条 ({})", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("⚠️ 缓存文件损坏，按空缓存处理 ({}): {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            path: Some(path),
            entries,
        }
    }

    /// 创建一个不落盘的禁用缓存（use_cache = false 时）
    pub fn disabled() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    /// 查询缓存
    ///
    /// 只有存储的补全条数恰好等于当前请求的 n 才算命中，
    /// 否则视为未命中、重新生成。
    pub fn lookup(&self, fingerprint: &str, n: usize) -> Option<&Vec<String>> {
        self.entries
            .get(fingerprint)
            .filter(|completions| completions.len() == n)
    }

    /// 写入缓存（只改内存，刷盘由 flush 负责）
    pub fn store(&mut self, fingerprint: String, completions: Vec<String>) {
        if self.path.is_some() {
            self.entries.insert(fingerprint, completions);
        }
    }

    /// 把当前缓存整体写回文件
    ///
    /// 缓存只是省钱的优化，刷盘失败记 warn 后继续，不中止运行。
    pub fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("⚠️ 无法创建缓存目录 {}: {}", parent.display(), e);
                return;
            }
        }

        match serde_json::to_string(&self.entries) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    warn!("⚠️ 缓存刷盘失败 {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("⚠️ 缓存序列化失败: {}", e),
        }
    }

    /// 当前缓存条数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
