//! 接口检查命令

use super::config::CliConfig;
use anyhow::Result;
use clap::Args;
use tiltstage_can::check_interface_status;

/// 检查命令参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// CAN 接口（覆盖配置）
    #[arg(short, long)]
    pub interface: Option<String>,
}

impl CheckCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let interface = self.interface.as_deref().unwrap_or(config.interface());

        match check_interface_status(interface)? {
            true => println!("✅ {} 已启动 (UP)", interface),
            false => println!(
                "⚠️  {} 存在但未启动 (DOWN)，连接时会以 {} bps 重新配置",
                interface,
                config.bitrate()
            ),
        }
        Ok(())
    }
}
