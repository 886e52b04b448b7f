//! 帧解码为可记录的结构化记录
//!
//! 用于通信日志：ID 三位大写十六进制、DLC、数据字节空格分隔。

use crate::{CommandKind, StageFrame};
use std::fmt;

/// 可记录的帧信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// CAN ID，大写十六进制，至少 3 位（如 `"001"`）
    pub id_hex: String,
    /// 数据长度码
    pub dlc: u8,
    /// 有效数据，两位大写十六进制，单空格分隔，无尾随空格（如 `"00 1A 50"`）
    pub data_hex: String,
    /// 驱动器指令类型（非驱动器指令为 `None`）
    pub kind: Option<CommandKind>,
}

/// 解码帧为记录
pub fn decode(frame: &StageFrame) -> FrameRecord {
    let data_hex = frame
        .data_slice()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");

    FrameRecord {
        id_hex: format!("{:03X}", frame.id),
        dlc: frame.len,
        data_hex,
        kind: CommandKind::classify(frame),
    }
}

impl fmt::Display for FrameRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID: 0x{} | DLC: {} | Data: {}",
            self.id_hex, self.dlc, self.data_hex
        )
    }
}
