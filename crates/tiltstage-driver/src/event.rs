//! 传输层事件
//!
//! 状态变化、错误、帧日志等通过 channel 从传输层（含接收线程）
//! 投递给前端，前端在自己的线程中按需消费。

use chrono::{DateTime, Local};
use std::fmt;
use tiltstage_protocol::{FrameRecord, StageFrame, decode};

/// 帧方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 接收
    Rx,
    /// 发送
    Tx,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Rx => "RX",
            Direction::Tx => "TX",
        }
    }
}

/// 一条帧日志
///
/// `Display` 输出形如：
///
/// ```text
/// [14:03:27.512] [RX] ID: 0x001 | DLC: 8 | Data: 00 1A 50 00 00 05 0B B8
/// ```
#[derive(Debug, Clone)]
pub struct FrameLog {
    pub direction: Direction,
    pub timestamp: DateTime<Local>,
    pub frame: StageFrame,
    pub record: FrameRecord,
}

impl FrameLog {
    pub fn new(direction: Direction, frame: StageFrame, timestamp: DateTime<Local>) -> Self {
        Self {
            direction,
            timestamp,
            record: decode(&frame),
            frame,
        }
    }

    /// 以当前本地时间记录
    pub fn now(direction: Direction, frame: StageFrame) -> Self {
        Self::new(direction, frame, Local::now())
    }
}

impl fmt::Display for FrameLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.direction.label(),
            self.record
        )
    }
}

/// 传输层事件
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// 连接状态变化
    StatusChanged { connected: bool },
    /// 错误（人类可读）
    Error(String),
    /// 收发帧日志
    FrameLogged(FrameLog),
    /// 位置指令已写入总线
    PositionSent { motor_id: u16, position_mm: f64 },
    /// 驱动器初始化序列已写入总线
    DriverInitialized { motor_id: u16 },
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::StatusChanged { connected: true } => write!(f, "[SYSTEM] connected"),
            TransportEvent::StatusChanged { connected: false } => {
                write!(f, "[SYSTEM] disconnected")
            },
            TransportEvent::Error(msg) => write!(f, "[ERROR] {}", msg),
            TransportEvent::FrameLogged(log) => write!(f, "{}", log),
            TransportEvent::PositionSent {
                motor_id,
                position_mm,
            } => write!(
                f,
                "[SYSTEM] motor {} position sent: {:.2} mm",
                motor_id, position_mm
            ),
            TransportEvent::DriverInitialized { motor_id } => {
                write!(f, "[SYSTEM] driver initialized (motor {})", motor_id)
            },
        }
    }
}
