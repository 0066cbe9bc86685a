/// 日志工具模块
///
/// 提供统一格式的运行日志输出
use tracing::info;

use crate::orchestrator::RunSummary;

/// 记录程序启动信息
///
/// # 参数
/// - `runner_name`: 运行的 runner 名称
/// - `model_repr`: 模型短名
/// - `num_workers`: 并发 worker 数量
pub fn log_startup(runner_name: &str, model_repr: &str, num_workers: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {} 模式", runner_name);
    info!("🤖 模型: {}", model_repr);
    info!("📊 并发 worker 数: {}", num_workers);
    info!("{}", "=".repeat(60));
}

/// 记录待处理工作量
///
/// # 参数
/// - `total`: 工作单元总数
/// - `skipped`: 已有结果、本次跳过的数量
/// - `batch_size`: 每批大小
pub fn log_workload(total: usize, skipped: usize, batch_size: usize) {
    info!("✓ 共 {} 个工作单元, 其中 {} 个已有结果跳过", total, skipped);
    info!("📋 将以每批 {} 个的方式处理", batch_size);
    info!("💡 每批完成后刷新一次缓存\n");
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号（从 1 开始）
/// - `total_batches`: 批次总数
/// - `size`: 本批工作单元数
pub fn log_batch_start(batch_num: usize, total_batches: usize, size: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批 ({} 个工作单元)", batch_num, total_batches, size);
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `summary`: 本次运行的统计
/// - `store_path`: 结果文件路径
pub fn print_final_stats(summary: &RunSummary, store_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}", summary.processed);
    info!("⏭️ 跳过: {}", summary.skipped);
    info!("❌ 失败: {}", summary.errored);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", store_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
