//! # Tiltstage Driver
//!
//! CAN 传输层：连接管理、同步发送、后台接收线程和事件投递。
//!
//! - [`CanTransport`]：对外 API，泛型于 socket 工厂（Mock 测试时替换）
//! - [`TransportEvent`]：状态、错误、帧日志等事件，经 `crossbeam-channel` 投递
//! - [`DriverError`]：驱动层错误

mod error;
pub mod event;
pub mod state;
mod transport;

pub use error::DriverError;
pub use event::{Direction, FrameLog, TransportEvent};
pub use state::{
    DEFAULT_BITRATE, DEFAULT_DISCONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, TransportConfig,
    TransportState,
};
pub use transport::CanTransport;

#[cfg(target_os = "linux")]
pub use transport::SocketCanTransport;
