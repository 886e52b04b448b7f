//! 移动命令
//!
//! 连接 → 初始化驱动器 → 计算并发送 → 断开。

use super::config::CliConfig;
use super::solve::{AngleArgs, print_displacements};
use crate::connection::{ConnectionArgs, build_facade, connect, print_pending};
use anyhow::Result;
use clap::Args;
use std::thread;
use std::time::Duration;
use tracing::info;

/// 断开前等待回复帧的时间
const REPLY_WAIT: Duration = Duration::from_millis(200);

/// 移动命令参数
#[derive(Args, Debug)]
pub struct MoveCommand {
    #[command(flatten)]
    pub angles: AngleArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl MoveCommand {
    pub fn execute(&self, config: &CliConfig) -> Result<()> {
        let (alpha, beta) = self.angles.validated()?;
        let (interface, bitrate) = self.connection.resolve(config);

        let facade = build_facade(&self.connection);
        let events = facade.transport().events();
        connect(&facade, &interface, bitrate, true)?;

        println!("⏳ α = {:.1}°, β = {:.1}°", alpha, beta);
        let result = facade.on_calculate(alpha, beta);

        thread::sleep(REPLY_WAIT);
        print_pending(&events);

        let outcome = match result {
            Ok((delta1, delta2)) => {
                print_displacements(delta1, delta2);
                Ok(())
            },
            Err(e) => Err(anyhow::anyhow!(e.user_message())),
        };

        facade.disconnect();
        print_pending(&events);
        info!("Move to alpha={:.1}° beta={:.1}° finished", alpha, beta);
        outcome
    }
}
