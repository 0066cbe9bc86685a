//! 数据集加载
//!
//! 数据集是一个 JSON 数组文件，一行一个子问题。

use std::path::Path;

use tracing::info;

use crate::error::DataError;
use crate::models::record::QuestionRecord;

/// 从 JSON 文件加载数据集
pub fn load_dataset(path: &str) -> Result<Vec<QuestionRecord>, DataError> {
    let content = std::fs::read_to_string(path).map_err(|e| DataError::ReadFailed {
        path: path.to_string(),
        source: e,
    })?;

    let records: Vec<QuestionRecord> =
        serde_json::from_str(&content).map_err(|e| DataError::JsonParseFailed {
            path: path.to_string(),
            source: e,
        })?;

    info!("✓ 数据集加载完成: {} 行 ({})", records.len(), path);
    Ok(records)
}

/// 数据集所在目录（图片路径相对于它解析）
pub fn dataset_parent_dir(data_dir: &str) -> String {
    Path::new(data_dir)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}
