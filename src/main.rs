mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use radar::config::ConfigLoader;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match ConfigLoader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            radar::logger::init_logger("info");
            return Err(e.into());
        }
    };

    // 初始化日志系统
    radar::logger::init_logger(&config.log_level);

    cli::dispatch(cli, config).await
}
