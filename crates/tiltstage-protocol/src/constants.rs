//! 协议常量定义

/// 位置换算系数：每毫米对应的驱动器脉冲数
pub const PULSE_PER_MM: f64 = 2000.0;

/// 所有驱动器指令的固定前缀（Byte 0-1）
pub const COMMAND_HEADER: [u8; 2] = [0x00, 0x1A];

/// 位置指令操作码（Byte 2）
pub const OPCODE_SET_POSITION: u8 = 0x50;

/// 模式设置操作码（Byte 2）
pub const OPCODE_SET_MODE: u8 = 0x02;

/// 使能操作码（Byte 2）
pub const OPCODE_ENABLE: u8 = 0x00;

/// 位置指令中插在脉冲高低字之间的固定标记字节（Byte 5）
pub const POSITION_MARKER: u8 = 0x05;

/// 模式设置帧（设置为位置模式）
pub const MODE_FRAME_PAYLOAD: [u8; 8] = [0x00, 0x1A, 0x02, 0x00, 0xD0, 0xFF, 0xFF, 0xFF];

/// 使能帧（启动电机）
pub const ENABLE_FRAME_PAYLOAD: [u8; 8] = [0x00, 0x1A, 0x00, 0x00, 0x01, 0xFF, 0xFF, 0xFF];

// ============================================================================
// SocketCAN `can_frame` 相关常量（与 linux/can.h 一致）
// ============================================================================

/// `struct can_frame` 的大小（字节）
pub const CAN_MTU: usize = 16;

/// 扩展帧标志位
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;

/// 远程帧标志位
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;

/// 错误帧标志位
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;

/// 标准帧 ID 掩码（11-bit）
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
