//! 连接参数与门面构建
//!
//! `move` / `monitor` / `check` 共用的接口参数，命令行参数优先于配置文件。

use crate::commands::config::CliConfig;
use clap::Args;
use tiltstage_driver::TransportEvent;

/// 连接参数
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// CAN 接口（覆盖配置）
    #[arg(short, long)]
    pub interface: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub bitrate: Option<u32>,

    /// 跳过接口启动（接口已由外部配置，如 vcan0）
    #[arg(long)]
    pub skip_bringup: bool,

    /// 不通过 sudo 执行 `ip link`
    #[arg(long)]
    pub no_sudo: bool,
}

impl ConnectionArgs {
    /// 解析最终使用的接口与波特率
    pub fn resolve(&self, config: &CliConfig) -> (String, u32) {
        let interface = self
            .interface
            .clone()
            .unwrap_or_else(|| config.interface().to_string());
        let bitrate = self.bitrate.unwrap_or_else(|| config.bitrate());
        (interface, bitrate)
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use anyhow::Context;
    use tiltstage_can::{IpLinkBringup, NoopBringup, SocketCanOpener};
    use tiltstage_control::{ControlError, ControlFacade};
    use tiltstage_driver::{CanTransport, TransportConfig};
    use tracing::{info, warn};

    pub type Facade = ControlFacade<SocketCanOpener>;

    /// 按参数构建控制门面（尚未连接）
    pub fn build_facade(args: &ConnectionArgs) -> Facade {
        let config = TransportConfig::default();
        let transport = if args.skip_bringup {
            CanTransport::new(SocketCanOpener, NoopBringup, config)
        } else {
            let bringup = IpLinkBringup::default().with_sudo(!args.no_sudo);
            CanTransport::new(SocketCanOpener, bringup, config)
        };
        ControlFacade::new(transport)
    }

    /// 连接（可选初始化驱动器），打印期间产生的事件
    pub fn connect(
        facade: &Facade,
        interface: &str,
        bitrate: u32,
        initialize: bool,
    ) -> anyhow::Result<()> {
        println!("🔌 连接到 {} ({} bps)...", interface, bitrate);
        info!(
            "Connecting to {} ({} bps), initialize = {}",
            interface, bitrate, initialize
        );

        let result = if initialize {
            facade.connect_and_initialize(interface, bitrate)
        } else {
            facade
                .transport()
                .connect(interface, bitrate)
                .map_err(ControlError::from)
        };
        print_pending(&facade.transport().events());

        if let Err(ControlError::Driver(e)) = &result
            && e.is_connect_failure()
        {
            warn!("Connect to {} failed at bring-up or socket open", interface);
            println!("💡 使用 `tiltstage-cli check --interface {}` 检查接口状态", interface);
        }
        result.with_context(|| format!("连接或初始化 {} 失败", interface))
    }
}

#[cfg(target_os = "linux")]
pub use linux::{build_facade, connect};

/// 打印已到达的所有事件
pub fn print_pending(events: &crossbeam_channel::Receiver<TransportEvent>) {
    for event in events.try_iter() {
        print_event(&event);
    }
}

pub fn print_event(event: &TransportEvent) {
    match event {
        TransportEvent::Error(_) => eprintln!("{}", event),
        _ => println!("{}", event),
    }
}
