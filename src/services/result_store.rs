//! 可续跑结果存储 - 业务能力层
//!
//! ## 职责
//!
//! 一个逻辑组一条记录的键值存储。写入立即落盘，
//! 因此"键存在"就是唯一的断点续跑信号：
//! 外层循环对每个组做 `exists(key) ? 跳过 : 计算并写入`，
//! 进程被杀后重跑只会补齐未完成的尾部。
//!
//! ## 文件格式
//!
//! 每个运行身份一个 JSON 文件：{model_repr}_{用途}_{数据版本}.json，
//! 内容是 键 → 记录 的扁平映射。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use tracing::info;

use crate::error::StoreError;

/// 可续跑结果存储
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    records: BTreeMap<String, JsonValue>,
}

impl ResultStore {
    /// 打开（或新建）一个结果存储
    ///
    /// 已有文件会整体载入，作为跳过检查的依据。
    /// 与缓存不同，已有文件损坏是致命错误：
    /// 当作空存储会导致已完成的组被覆盖重算。
    pub fn open(output_dir: &str, store_name: &str) -> Result<Self, StoreError> {
        let path = Path::new(output_dir).join(format!("{}.json", store_name));

        let records = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::ReadFailed {
                    path: path.display().to_string(),
                    source: e,
                })?;
            let records: BTreeMap<String, JsonValue> = serde_json::from_str(&content)
                .map_err(|e| StoreError::CorruptFile {
                    path: path.display().to_string(),
                    source: e,
                })?;
            info!(
                "✓ 已有结果载入: {} 条记录 ({})",
                records.len(),
                path.display()
            );
            records
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, records })
    }

    /// 键是否已有记录
    pub fn exists(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// 读取一条记录
    pub fn read(&self, key: &str) -> Option<&JsonValue> {
        self.records.get(key)
    }

    /// 写入一条记录并立即落盘
    ///
    /// 落盘失败向上传播（对该次运行是致命的）：
    /// 静默丢弃已完成的计算会破坏可续跑不变量。
    pub fn write(&mut self, key: &str, record: JsonValue) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), record);
        self.persist()
    }

    /// 当前记录条数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 全部记录的迭代器（评测汇总用）
    pub fn iter(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.records.iter()
    }

    /// 整体写盘：先写临时文件再改名，保证写入原子性
    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::WriteFailed {
                path: self.path.display().to_string(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(&self.records)
            .map_err(|e| StoreError::SerializeFailed { source: e })?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content).map_err(|e| StoreError::WriteFailed {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::WriteFailed {
            path: self.path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }
}
