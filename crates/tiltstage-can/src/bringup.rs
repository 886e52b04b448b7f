//! CAN 接口启动
//!
//! SocketCAN 的波特率只能通过 `ip link` 配置，打开 socket 之前需要依次执行：
//!
//! ```text
//! ip link set <iface> down
//! ip link set <iface> type can bitrate <bitrate>
//! ip link set <iface> up
//! ```
//!
//! 每一步都有独立的超时，任何一步失败都视为整个启动失败。

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 单步默认超时
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_millis(2000);

/// 子进程状态轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 接口启动错误
#[derive(Error, Debug)]
pub enum BringupError {
    /// 命令在超时时间内未结束（已被终止）
    #[error("command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    /// 命令以非零状态退出
    #[error("command failed ({status}): {command}\n{stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// 无法启动或等待子进程
    #[error("failed to run command: {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// 接口启动能力
///
/// 驱动层在打开 socket 之前调用；实现需保证步骤顺序为 down → 配置 → up。
pub trait InterfaceBringup: Send + Sync + 'static {
    fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BringupError>;
}

/// 通过 `ip link` 命令启动接口（默认实现）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpLinkBringup {
    /// `ip` 可执行文件
    pub program: String,
    /// 是否通过 `sudo -n` 执行（配置接口需要 CAP_NET_ADMIN）
    pub use_sudo: bool,
    /// 每一步的超时
    pub step_timeout: Duration,
}

impl Default for IpLinkBringup {
    fn default() -> Self {
        Self {
            program: "ip".to_string(),
            use_sudo: true,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl IpLinkBringup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// 三个步骤的 `ip` 参数（按执行顺序）
    pub fn step_args(interface: &str, bitrate: u32) -> [Vec<String>; 3] {
        let link = |rest: &[&str]| {
            ["link", "set", interface]
                .iter()
                .chain(rest)
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        };
        let bitrate = bitrate.to_string();
        [
            link(&["down"]),
            link(&["type", "can", "bitrate", bitrate.as_str()]),
            link(&["up"]),
        ]
    }

    fn command_for(&self, args: &[String]) -> (Command, String) {
        let mut command = if self.use_sudo {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(&self.program);
            c
        } else {
            Command::new(&self.program)
        };
        command.args(args);

        let prefix = if self.use_sudo { "sudo -n " } else { "" };
        let text = format!("{}{} {}", prefix, self.program, args.join(" "));
        (command, text)
    }
}

impl InterfaceBringup for IpLinkBringup {
    fn bring_up(&self, interface: &str, bitrate: u32) -> Result<(), BringupError> {
        info!("Bringing up CAN interface '{}' at {} bps", interface, bitrate);

        for args in Self::step_args(interface, bitrate) {
            let (command, text) = self.command_for(&args);
            run_step(command, &text, self.step_timeout)?;
        }

        debug!("CAN interface '{}' is up", interface);
        Ok(())
    }
}

/// 不做任何配置（接口已由外部配置，如 vcan0）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopBringup;

impl InterfaceBringup for NoopBringup {
    fn bring_up(&self, interface: &str, _bitrate: u32) -> Result<(), BringupError> {
        debug!(
            "Skipping bring-up for '{}' (configured externally)",
            interface
        );
        Ok(())
    }
}

/// 执行单个步骤，超时则终止子进程
///
/// 非零退出时返回子进程的 stderr。
pub fn run_step(mut command: Command, text: &str, timeout: Duration) -> Result<(), BringupError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!("Running: {}", text);
    let mut child = command.spawn().map_err(|source| BringupError::Spawn {
        command: text.to_string(),
        source,
    })?;

    let deadline = Instant::now() + timeout;
    loop {
        let status = child.try_wait().map_err(|source| BringupError::Spawn {
            command: text.to_string(),
            source,
        })?;

        match status {
            Some(status) if status.success() => return Ok(()),
            Some(status) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                warn!("Command failed ({}): {}", status, text);
                return Err(BringupError::Failed {
                    command: text.to_string(),
                    status: status.to_string(),
                    stderr: stderr.trim().to_string(),
                });
            },
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                warn!("Command timed out after {:?}: {}", timeout, text);
                return Err(BringupError::Timeout {
                    command: text.to_string(),
                    timeout,
                });
            },
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}
