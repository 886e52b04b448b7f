//! 控制层错误类型

use thiserror::Error;
use tiltstage_driver::DriverError;
use tiltstage_protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// 配置错误（电机 ID 不是合法的 11-bit 标准帧 ID）
    #[error("invalid motor configuration: {0}")]
    Config(#[from] ProtocolError),

    /// 角度不是有限值（NaN / ∞），无法求解
    #[error("{axis} angle {value} is not a finite number")]
    NonFiniteAngle { axis: &'static str, value: f64 },
}

impl ControlError {
    /// 面向用户的单行错误信息
    pub fn user_message(&self) -> String {
        format!("calculation or send failed: {}", self)
    }
}
