//! 控制门面
//!
//! 把逆运动学结果转换为两路电机的位置指令，并负责连接后的驱动器初始化。

use crate::error::ControlError;
use crate::kinematics::StageGeometry;
use std::thread;
use std::time::Duration;
use tiltstage_can::SocketOpener;
use tiltstage_driver::CanTransport;
use tiltstage_protocol::{ProtocolError, validate_motor_id};
use tracing::{error, info};

/// 默认连接后等待时间（接收线程启动后再发初始化序列）
pub const DEFAULT_INIT_DELAY: Duration = Duration::from_millis(200);

/// 控制配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    /// `connect_and_initialize` 中连接成功后的等待时间
    pub init_delay: Duration,
    /// 两根推杆对应的电机 ID（推杆 1, 推杆 2），必须是 11-bit 标准帧 ID
    pub motor_ids: [u16; 2],
}

impl ControlConfig {
    /// 校验电机 ID
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for motor_id in self.motor_ids {
            validate_motor_id(motor_id)?;
        }
        Ok(())
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            init_delay: DEFAULT_INIT_DELAY,
            motor_ids: [1, 2],
        }
    }
}

/// 控制门面
///
/// 角度范围（±45°）由调用方约束；门面不限幅，超出范围的角度照常求解并下发。
pub struct ControlFacade<O: SocketOpener> {
    transport: CanTransport<O>,
    geometry: StageGeometry,
    config: ControlConfig,
}

impl<O: SocketOpener> ControlFacade<O> {
    pub fn new(transport: CanTransport<O>) -> Self {
        Self {
            transport,
            geometry: StageGeometry::DEFAULT,
            config: ControlConfig::default(),
        }
    }

    /// 使用自定义几何与配置创建，电机 ID 非法时返回 `ControlError::Config`
    pub fn with_config(
        transport: CanTransport<O>,
        geometry: StageGeometry,
        config: ControlConfig,
    ) -> Result<Self, ControlError> {
        config.validate()?;
        Ok(Self {
            transport,
            geometry,
            config,
        })
    }

    pub fn transport(&self) -> &CanTransport<O> {
        &self.transport
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// 连接并初始化所有驱动器
    ///
    /// 某个驱动器初始化失败时仍会继续初始化其余驱动器，返回第一个错误。
    pub fn connect_and_initialize(&self, interface: &str, bitrate: u32) -> Result<(), ControlError> {
        self.transport.connect(interface, bitrate)?;
        thread::sleep(self.config.init_delay);

        let mut first_error = None;
        for motor_id in self.config.motor_ids {
            if let Err(e) = self.transport.send_init_sequence(motor_id) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    /// 计算并发送
    ///
    /// 角度（度）→ 弧度 → 逆运动学 → 电机 1、电机 2 依次发送位置指令。
    /// 电机 1 发送失败时电机 2 仍会发送，返回第一个错误。
    /// 传输层错误由传输层上报为 `Error` 事件，门面自身发现的错误由门面上报。
    pub fn on_calculate(&self, alpha_deg: f64, beta_deg: f64) -> Result<(f64, f64), ControlError> {
        self.calculate_and_send(alpha_deg, beta_deg)
            .inspect_err(|e| {
                error!("{}", e.user_message());
                if !matches!(e, ControlError::Driver(_)) {
                    self.transport.report_error(e.user_message());
                }
            })
    }

    fn calculate_and_send(&self, alpha_deg: f64, beta_deg: f64) -> Result<(f64, f64), ControlError> {
        check_finite("alpha", alpha_deg)?;
        check_finite("beta", beta_deg)?;

        let (delta1, delta2) = self
            .geometry
            .solve(alpha_deg.to_radians(), beta_deg.to_radians());

        let [motor1, motor2] = self.config.motor_ids;
        let first = self.transport.send_position(motor1, delta1);
        let second = self.transport.send_position(motor2, delta2);
        first.and(second)?;

        info!(
            "alpha={:.1}° beta={:.1}° -> motor {}: {:.2} mm, motor {}: {:.2} mm",
            alpha_deg, beta_deg, motor1, delta1, motor2, delta2
        );
        Ok((delta1, delta2))
    }
}

fn check_finite(axis: &'static str, value: f64) -> Result<(), ControlError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControlError::NonFiniteAngle { axis, value })
    }
}
