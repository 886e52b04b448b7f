//! 监控命令
//!
//! 连接后持续打印收发帧，直到 Ctrl+C。

use super::config::CliConfig;
use crate::connection::{ConnectionArgs, build_facade, connect, print_event, print_pending};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;

/// 事件等待间隔（决定 Ctrl+C 的响应延迟）
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 连接后不发送驱动器初始化序列
    #[arg(long)]
    pub no_init: bool,
}

impl MonitorCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let (interface, bitrate) = self.connection.resolve(config);
        let facade = build_facade(&self.connection);
        let events = facade.transport().events();

        connect(&facade, &interface, bitrate, !self.no_init)?;

        // 设置 Ctrl+C 处理
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
        })
        .context("设置 Ctrl+C 处理失败")?;

        println!("📊 监控中，按 Ctrl+C 停止\n");
        while running.load(Ordering::SeqCst) {
            if let Ok(event) = events.recv_timeout(POLL_INTERVAL) {
                print_event(&event);
            }
        }

        println!("\n收到退出信号，正在关闭...");
        info!("Monitor on {} stopped", interface);
        facade.disconnect();
        print_pending(&events);
        Ok(())
    }
}
