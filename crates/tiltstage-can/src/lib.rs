//! # Tiltstage CAN Layer
//!
//! CAN 硬件抽象层：
//! - [`RawCanSocket`] / [`SocketOpener`]：原始 CAN socket 的最小读写接口，
//!   驱动层只依赖 trait，测试时可替换为 Mock
//! - [`bringup`]：接口启动（down / 设置波特率 / up）
//! - `socketcan`：Linux SocketCAN 实现（仅 Linux）

use std::io;
use std::time::Duration;
use thiserror::Error;

pub use tiltstage_protocol::{CAN_MTU, StageFrame};

pub mod bringup;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use bringup::{BringupError, InterfaceBringup, IpLinkBringup, NoopBringup};

#[cfg(target_os = "linux")]
pub use socketcan::{SocketCanOpener, SocketCanSocket, check_interface_status};

/// CAN 层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// socket(PF_CAN, SOCK_RAW, CAN_RAW) 失败
    #[error("socket creation failed: {0}")]
    SocketCreate(#[source] io::Error),

    /// 接口名解析为内核索引失败（SIOCGIFINDEX）
    #[error("interface binding failed ({interface}): {source}")]
    InterfaceResolve {
        interface: String,
        #[source]
        source: io::Error,
    },

    /// bind(sockaddr_can) 失败
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    /// 接口不存在、名称非法等
    #[error("Interface error: {0}")]
    Interface(String),

    #[error("interface bring-up failed: {0}")]
    Bringup(#[from] BringupError),
}

impl CanError {
    /// 是否为 socket 打开阶段的错误（创建/解析/绑定）
    pub fn is_socket_failure(&self) -> bool {
        matches!(
            self,
            CanError::SocketCreate(_) | CanError::InterfaceResolve { .. } | CanError::Bind(_)
        )
    }
}

/// 原始 CAN socket
///
/// 以 `can_frame` 为单位读写（[`CAN_MTU`] 字节）。
/// 读写可以在不同线程中并发调用（`&self`）。
pub trait RawCanSocket: Send + Sync + 'static {
    /// 读取一个帧单元
    ///
    /// 返回实际读取的字节数；等待超时返回 `ErrorKind::WouldBlock`。
    fn read_unit(&self, buf: &mut [u8; CAN_MTU]) -> io::Result<usize>;

    /// 写入一个帧单元，返回实际写入的字节数
    fn write_unit(&self, buf: &[u8; CAN_MTU]) -> io::Result<usize>;
}

/// socket 工厂：打开并绑定到指定接口
pub trait SocketOpener: Send + Sync + 'static {
    type Socket: RawCanSocket;

    /// 打开 socket
    ///
    /// # 参数
    /// - `interface`: 接口名称（如 "can0"）
    /// - `read_timeout`: 单次读等待上限，超时后 `read_unit` 返回 `WouldBlock`
    fn open(&self, interface: &str, read_timeout: Duration) -> Result<Self::Socket, CanError>;
}

/// 判断读错误是否可重试（超时 / 被信号打断）
pub fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
