use anyhow::{Context, Result};

use batch_answer_gen::{build_runner, logger, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logger::init();

    // 配置文件路径来自第一个命令行参数
    let config_path = std::env::args()
        .nth(1)
        .context("用法: batch_answer_gen <config.toml>")?;
    let config = Config::load(&config_path)?;

    // 构造并运行 runner
    let mut runner = build_runner(config)?;
    runner.run().await?;

    Ok(())
}
