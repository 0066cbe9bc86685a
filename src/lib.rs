//! # Batch Answer Gen
//!
//! 金融多模态基准数据集的批量模型回答生成 / 评测 / 蒸馏引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 只持有低层执行能力
//! - `UnitExecutor` - 有界并发的工作单元执行器，输出顺序恒等于输入顺序
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个能力只做一件事
//! - `GenerationBackend` / `OpenAiBackend` - 生成能力（一个 prompt，n 条补全）
//! - `FingerprintCache` - 请求指纹缓存，消除重复后端调用
//! - `ResultStore` - 可续跑结果存储，键存在即跳过
//! - `recovery` - 响应恢复管线（直接解析 → 修复重试 → 正则兜底）
//! - `grouper` / `images` / `prompt` - 分组校验、图片收集、提示词模板
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个问题组"的完整处理流程
//! - `GroupCtx` - 上下文封装（组序号 + 组键）
//! - `GroupFlow` - 流程编排（组装 → 恢复 → 合并）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/` - 三个 runner（生成 / 评测 / 蒸馏），
//!   管理资源、按批调度、汇总统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::UnitExecutor;
pub use models::{QuestionGroup, QuestionRecord};
pub use orchestrator::{build_runner, RunSummary, Runner};
pub use services::{FingerprintCache, GenerationBackend, ResultStore, WorkItem};
pub use workflow::{GroupCtx, GroupFlow};
