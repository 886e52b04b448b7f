//! 驱动层错误类型定义

use std::io;
use thiserror::Error;
use tiltstage_can::CanError;
use tiltstage_protocol::ProtocolError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 层错误（接口启动、socket 创建/解析/绑定）
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议编码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 未连接时发送
    #[error("CAN not connected")]
    NotConnected,

    /// 写 socket 失败
    #[error("send failed: {0}")]
    Write(#[source] io::Error),

    /// 写入字节数少于一个完整帧
    #[error("send failed: short write ({written} of {expected} bytes)")]
    ShortTransfer { written: usize, expected: usize },

    /// 初始化序列（模式帧 + 使能帧）发送失败
    #[error("initialization command send failed (motor {motor_id}): {source}")]
    InitSequence {
        motor_id: u16,
        #[source]
        source: Box<DriverError>,
    },

    /// 接收线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),
}

impl DriverError {
    /// 是否为 connect 阶段的错误（失败后传输层回到 Disconnected）
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, DriverError::Can(_))
    }
}
