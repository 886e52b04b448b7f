//! # Tiltstage CLI
//!
//! 两轴倾斜台命令行工具。
//!
//! ```bash
//! # 配置默认接口与波特率
//! tiltstage-cli config set --interface can0 --bitrate 500000
//!
//! # 只计算
//! tiltstage-cli solve --alpha 10 --beta -5
//!
//! # 连接 -> 初始化驱动器 -> 计算并发送 -> 断开
//! tiltstage-cli move --alpha 10 --beta -5
//!
//! # 打印总线上的帧，直到 Ctrl+C
//! tiltstage-cli monitor --interface vcan0 --skip-bringup
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod connection;

use commands::config::{CliConfig, config_path};
use commands::{ConfigCommand, SolveCommand};

#[cfg(target_os = "linux")]
use commands::{CheckCommand, MonitorCommand, MoveCommand};

/// 默认日志级别（工作区内各 crate）
const LOG_DIRECTIVES: [&str; 5] = [
    "tiltstage_cli=info",
    "tiltstage_control=info",
    "tiltstage_driver=info",
    "tiltstage_can=info",
    "tiltstage_protocol=info",
];

/// Tiltstage CLI - 两轴倾斜台命令行工具
#[derive(Parser, Debug)]
#[command(name = "tiltstage-cli")]
#[command(about = "Command-line front-end for the two-axis tilt stage", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 <config_dir>/tiltstage/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 计算推杆伸缩量（不连接总线）
    Solve {
        #[command(flatten)]
        args: SolveCommand,
    },

    /// 移动到目标倾角
    #[cfg(target_os = "linux")]
    Move {
        #[command(flatten)]
        args: MoveCommand,
    },

    /// 监控总线上的帧
    #[cfg(target_os = "linux")]
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },

    /// 检查接口状态
    #[cfg(target_os = "linux")]
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志（stderr，不与命令输出混在一起）
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&path),

        Commands::Solve { args } => args.execute(),

        #[cfg(target_os = "linux")]
        Commands::Move { args } => args.execute(&CliConfig::load(&path)?),

        #[cfg(target_os = "linux")]
        Commands::Monitor { args } => args.execute(&CliConfig::load(&path)?),

        #[cfg(target_os = "linux")]
        Commands::Check { args } => args.execute(&CliConfig::load(&path)?),
    }
}
