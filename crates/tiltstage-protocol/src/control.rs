//! 控制帧构建
//!
//! 驱动器指令均为 8 字节负载，前两字节固定为 `00 1A`，第三字节为操作码。
//! 位置指令的字节布局比较特殊：脉冲值按大端拆成高低两个字，
//! 中间插入一个固定的 `0x05` 标记字节：
//!
//! | Byte0 | Byte1 | Byte2 | Byte3 | Byte4 | Byte5 | Byte6 | Byte7 |
//! |-------|-------|-------|-------|-------|-------|-------|-------|
//! | 0x00 | 0x1A | 0x50 | p[31:24] | p[23:16] | 0x05 | p[15:8] | p[7:0] |
//!
//! 该布局需要与驱动器固件保持一致，不要"修正"。

use crate::{
    CAN_SFF_MASK, COMMAND_HEADER, ENABLE_FRAME_PAYLOAD, MODE_FRAME_PAYLOAD, OPCODE_SET_POSITION,
    POSITION_MARKER, PULSE_PER_MM, ProtocolError, StageFrame, bytes_to_i32_be, i32_to_bytes_be,
};
use num_enum::TryFromPrimitive;

/// 指令类型（由 Byte 2 操作码区分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandKind {
    /// 使能电机
    Enable = 0x00,
    /// 设置控制模式
    SetMode = 0x02,
    /// 设置目标位置
    SetPosition = 0x50,
}

impl CommandKind {
    /// 根据指令头识别帧类型，非驱动器指令返回 `None`
    pub fn classify(frame: &StageFrame) -> Option<Self> {
        if frame.len != 8 || frame.data[..2] != COMMAND_HEADER {
            return None;
        }
        Self::try_from(frame.data[2]).ok()
    }
}

/// 校验电机 ID 可以作为 11-bit 标准帧 ID
///
/// [`encode_position`] 与 [`encode_init_sequence`] 会截取低 11 位，
/// 越界 ID 会指向另一台电机，发送前需先校验。
pub fn validate_motor_id(motor_id: u16) -> Result<u16, ProtocolError> {
    if u32::from(motor_id) > CAN_SFF_MASK {
        return Err(ProtocolError::InvalidCanId {
            id: u32::from(motor_id),
        });
    }
    Ok(motor_id)
}

/// 毫米转脉冲
///
/// 四舍五入（远离零方向），超出 i32 范围时饱和，NaN 映射为 0。
pub fn mm_to_pulse(position_mm: f64) -> i32 {
    (position_mm * PULSE_PER_MM).round() as i32
}

/// 脉冲转毫米
pub fn pulse_to_mm(pulse: i32) -> f64 {
    f64::from(pulse) / PULSE_PER_MM
}

/// 位置指令
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionCommand {
    /// 电机 ID（同时作为 CAN ID）
    pub motor_id: u16,
    /// 目标位置（毫米，负值表示回缩）
    pub position_mm: f64,
}

impl PositionCommand {
    pub fn new(motor_id: u16, position_mm: f64) -> Self {
        Self {
            motor_id,
            position_mm,
        }
    }

    /// 目标位置对应的脉冲数
    pub fn pulse(&self) -> i32 {
        mm_to_pulse(self.position_mm)
    }

    /// 转换为 CAN 帧
    pub fn to_frame(self) -> StageFrame {
        let [p3, p2, p1, p0] = i32_to_bytes_be(self.pulse());

        let data = [
            COMMAND_HEADER[0],
            COMMAND_HEADER[1],
            OPCODE_SET_POSITION,
            p3,
            p2,
            POSITION_MARKER,
            p1,
            p0,
        ];

        StageFrame::new_standard(self.motor_id, &data)
    }
}

/// 构建位置指令帧
pub fn encode_position(motor_id: u16, position_mm: f64) -> StageFrame {
    PositionCommand::new(motor_id, position_mm).to_frame()
}

/// 构建驱动器初始化序列：(模式设置帧, 使能帧)，必须按此顺序发送
pub fn encode_init_sequence(motor_id: u16) -> (StageFrame, StageFrame) {
    (
        StageFrame::new_standard(motor_id, &MODE_FRAME_PAYLOAD),
        StageFrame::new_standard(motor_id, &ENABLE_FRAME_PAYLOAD),
    )
}

/// 从位置指令帧中还原脉冲值（Byte 3,4,6,7）
///
/// 非位置指令帧返回 `None`。
pub fn decode_position(frame: &StageFrame) -> Option<i32> {
    if CommandKind::classify(frame) != Some(CommandKind::SetPosition) {
        return None;
    }
    let d = &frame.data;
    Some(bytes_to_i32_be([d[3], d[4], d[6], d[7]]))
}
