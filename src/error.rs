//! 错误类型定义
//!
//! 错误分为四大类，按"是否允许中止整个批次"划分：
//! - 配置 / 数据错误：致命，在任何后端调用之前抛出
//! - 后端错误：按组隔离，记录日志后继续
//! - 存储错误：致命（静默丢弃已完成的计算会破坏断点续跑）
//! - 解析恢复从不产生致命错误，由 `Recovered::Failed` 表达

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 数据集错误
    #[error("数据集错误: {0}")]
    Data(#[from] DataError),
    /// 后端调用错误
    #[error("后端错误: {0}")]
    Backend(#[from] BackendError),
    /// 结果存储错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
}

/// 配置错误（致命）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("无法解析配置文件 {path}: {source}")]
    ParseFailed {
        path: String,
        source: toml::de::Error,
    },
    #[error("未知的 runner 名称: {name}")]
    UnknownRunner { name: String },
    #[error("缺少必需的配置项: {field}")]
    MissingField { field: String },
}

/// 数据集错误（致命，在任何后端调用之前检查）
#[derive(Debug, Error)]
pub enum DataError {
    #[error("无法读取数据文件 {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("无法解析数据文件 {path}: {source}")]
    JsonParseFailed {
        path: String,
        source: serde_json::Error,
    },
    #[error("未知语言: {language}")]
    UnknownLanguage { language: String },
    #[error("主题号不连续 (release: {release}, 语言: {language}): 期望 {expected}, 实际 {found}")]
    MainIdNotContiguous {
        release: String,
        language: String,
        expected: u32,
        found: u32,
    },
    #[error("子题号不连续 (语言: {language}, 主题号: {main_question_id}): 期望 {expected}, 实际 {found}")]
    SubIdNotContiguous {
        language: String,
        main_question_id: u32,
        expected: u32,
        found: u32,
    },
}

/// 后端调用错误（按组隔离，不中止批次）
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("后端 API 调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("后端返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 后端违反了"每个请求恰好返回 n 条补全"的约定，必须让整个批次失败
    #[error("后端返回补全数量错误: 期望 {expected}, 实际 {found}")]
    WrongCompletionCount { expected: usize, found: usize },
}

/// 结果存储错误（致命）
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("无法写入结果文件 {path}: {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
    #[error("结果序列化失败: {source}")]
    SerializeFailed { source: serde_json::Error },
    #[error("无法读取已有结果文件 {path}: {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// 已有结果文件损坏时必须报错，覆盖写会丢掉已完成的工作
    #[error("已有结果文件损坏 {path}: {source}")]
    CorruptFile {
        path: String,
        source: serde_json::Error,
    },
}

/// 应用程序结果类型别名
pub type AppResult<T> = std::result::Result<T, AppError>;
