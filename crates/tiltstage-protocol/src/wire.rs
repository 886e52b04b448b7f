//! SocketCAN `struct can_frame` 原始字节布局
//!
//! ```text
//! offset 0..4   can_id   (u32, 主机字节序，高 3 位为 EFF/RTR/ERR 标志)
//! offset 4      can_dlc  (u8)
//! offset 5..8   padding / reserved
//! offset 8..16  data[8]
//! ```
//!
//! 这里显式地按字节构建/解析，不做结构体内存重解释。

use crate::{
    CAN_EFF_FLAG, CAN_ERR_FLAG, CAN_MTU, CAN_RTR_FLAG, CAN_SFF_MASK, ProtocolError, StageFrame,
};

const ID_RANGE: std::ops::Range<usize> = 0..4;
const DLC_OFFSET: usize = 4;
const DATA_OFFSET: usize = 8;

impl StageFrame {
    /// 编码为 `can_frame` 字节
    ///
    /// DLC 之后的数据字节一律写 0。
    pub fn to_wire(&self) -> [u8; CAN_MTU] {
        let mut buf = [0u8; CAN_MTU];
        let can_id = u32::from(self.id) & CAN_SFF_MASK;
        buf[ID_RANGE].copy_from_slice(&can_id.to_ne_bytes());
        buf[DLC_OFFSET] = self.len;
        let payload = self.data_slice();
        buf[DATA_OFFSET..DATA_OFFSET + payload.len()].copy_from_slice(payload);
        buf
    }

    /// 从 `can_frame` 字节解析
    ///
    /// # 错误
    /// - `InvalidLength`: 不是完整的 `can_frame`
    /// - `UnsupportedFrame`: 扩展帧、远程帧或错误帧
    /// - `InvalidDlc`: DLC 大于 8
    pub fn from_wire(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != CAN_MTU {
            return Err(ProtocolError::InvalidLength {
                expected: CAN_MTU,
                actual: buf.len(),
            });
        }

        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&buf[ID_RANGE]);
        let can_id = u32::from_ne_bytes(id_bytes);

        let flags = can_id & (CAN_EFF_FLAG | CAN_RTR_FLAG | CAN_ERR_FLAG);
        if flags != 0 {
            return Err(ProtocolError::UnsupportedFrame { flags });
        }

        let dlc = buf[DLC_OFFSET] as usize;
        if dlc > 8 {
            return Err(ProtocolError::InvalidDlc { dlc });
        }

        Ok(StageFrame::new_standard(
            (can_id & CAN_SFF_MASK) as u16,
            &buf[DATA_OFFSET..DATA_OFFSET + dlc],
        ))
    }
}
