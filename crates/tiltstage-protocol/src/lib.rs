//! # Tiltstage Protocol
//!
//! 倾斜台电机驱动器 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（指令头、脉冲当量、SocketCAN 标志位）
//! - `control`: 控制帧构建（位置、模式、使能）
//! - `record`: 帧解码为可记录的结构化文本
//! - `wire`: 与 SocketCAN `can_frame` 原始字节布局的互相转换
//!
//! ## 字节序
//!
//! 指令负载中的多字节字段使用 Motorola (MSB) 高位在前（大端字节序）。

pub mod constants;
pub mod control;
pub mod record;
pub mod wire;

pub use constants::*;
pub use control::*;
pub use record::*;

use thiserror::Error;

/// CAN 2.0 标准帧
///
/// 协议层与 CAN 层之间的中间抽象：协议层只产生/解析 `StageFrame`，
/// 不关心底层 socket 细节。
///
/// - **Copy**：固定 8 字节负载，无堆分配
/// - **仅标准帧**：11-bit ID，不建模扩展帧/远程帧/错误帧
/// - `timestamp_us` 只在接收方向填充，不会写入总线
///
/// ```rust
/// use tiltstage_protocol::StageFrame;
///
/// let frame = StageFrame::new_standard(0x123, &[1, 2, 3, 4]);
/// assert_eq!(frame.id(), 0x123);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageFrame {
    /// CAN ID（11-bit）
    pub id: u16,

    /// 帧数据（固定 8 字节，DLC 之后的部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 接收时间戳（Unix 纪元起的微秒数），0 表示不可用
    pub timestamp_us: u64,
}

impl StageFrame {
    /// 创建标准帧
    ///
    /// ID 按 SocketCAN 的 `CAN_SFF_MASK` 截取低 11 位，数据超过 8 字节的部分被丢弃。
    /// 需要严格校验时使用 [`StageFrame::try_new_standard`]。
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id: id & CAN_SFF_MASK as u16,
            data: fixed_data,
            len: len as u8,
            timestamp_us: 0,
        }
    }

    /// 创建标准帧（校验 ID 与数据长度）
    pub fn try_new_standard(id: u16, data: &[u8]) -> Result<Self, ProtocolError> {
        if u32::from(id) > CAN_SFF_MASK {
            return Err(ProtocolError::InvalidCanId { id: u32::from(id) });
        }
        if data.len() > 8 {
            return Err(ProtocolError::InvalidDlc { dlc: data.len() });
        }
        Ok(Self::new_standard(id, data))
    }

    /// 附加接收时间戳
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u16 {
        self.id
    }

    /// 获取数据长度码
    pub fn dlc(&self) -> u8 {
        self.len
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Invalid DLC: {dlc} (max 8)")]
    InvalidDlc { dlc: usize },

    #[error("Unsupported frame type (can_id flags 0x{flags:08X})")]
    UnsupportedFrame { flags: u32 },
}

/// 大端字节序转 i32
pub fn bytes_to_i32_be(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// i32 转大端字节序
pub fn i32_to_bytes_be(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}
