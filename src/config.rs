//! 程序配置
//!
//! 配置来自一个 TOML 文件（路径由命令行参数指定），
//! API key 可以通过环境变量 `LLM_API_KEY` 覆盖，避免写进配置文件。

use std::path::Path;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::services::backend::BackendCapability;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// 使用哪个 runner（generation / evaluation / distillation）
    pub runner_name: String,
    /// 后端模型配置
    pub model: ModelConfig,
    /// 生成参数
    #[serde(default)]
    pub generation: GenerationConfig,
    /// 数据集配置
    pub data: DataConfig,
    /// 运行参数
    #[serde(default)]
    pub run: RunConfig,
}

/// 后端模型配置
#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    /// 完整模型名（传给 API）
    pub model_name: String,
    /// 短名，用于缓存 / 结果文件命名；缺省时使用 model_name
    pub model_repr: Option<String>,
    /// API key（可被环境变量 LLM_API_KEY 覆盖）
    #[serde(default)]
    pub api_key: String,
    /// 自定义 API 端点（兼容 OpenAI API 的服务）
    pub api_base: Option<String>,
    /// 后端能力标签
    #[serde(default)]
    pub capability: BackendCapability,
}

impl ModelConfig {
    /// 用于文件命名的模型短名
    pub fn repr(&self) -> &str {
        self.model_repr.as_deref().unwrap_or(&self.model_name)
    }
}

/// 生成参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 每个请求的补全条数 N
    pub n: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            n: 1,
            temperature: 0.3,
            max_tokens: 1024,
        }
    }
}

/// 数据集配置
#[derive(Clone, Debug, Deserialize)]
pub struct DataConfig {
    /// 数据集 JSON 文件路径
    pub data_dir: String,
    /// 标准答案文件路径（评测用；缺省时使用 data_dir 本身）
    pub gold_dir: Option<String>,
    /// 只处理指定主题号（调试用）
    pub main_question_id: Option<u32>,
    /// 只处理指定题目（蒸馏用），格式 {language}_{main}_{sub}_{version}
    pub question_ids: Option<Vec<String>>,
}

impl DataConfig {
    /// 从数据文件名推导 release 版本号（如 release_v2406.json → release_v2406）
    pub fn release_version(&self) -> String {
        Path::new(&self.data_dir)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// 运行参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 并发 worker 数量；1 为严格顺序执行（参考语义）
    pub num_workers: usize,
    /// 是否启用指纹缓存
    pub use_cache: bool,
    /// 缓存目录
    pub cache_dir: String,
    /// 结果输出目录
    pub output_dir: String,
    /// 每处理多少个组刷新一次缓存文件
    pub cache_batch_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            use_cache: true,
            cache_dir: "cache".to_string(),
            output_dir: "output".to_string(),
            cache_batch_size: 8,
        }
    }
}

impl Config {
    /// 从 TOML 文件加载配置
    pub fn load(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_string(),
            source: e,
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseFailed {
                path: path.to_string(),
                source: e,
            })?;

        // 环境变量覆盖 API key
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.model.api_key = key;
        }

        if config.model.api_key.is_empty() {
            return Err(ConfigError::MissingField {
                field: "model.api_key (或环境变量 LLM_API_KEY)".to_string(),
            }
            .into());
        }

        Ok(config)
    }
}
