//! # Tiltstage Control
//!
//! - [`kinematics`]：两轴倾斜台逆运动学（角度 → 推杆伸缩量）
//! - [`ControlFacade`]：计算结果下发到两路电机，连接后初始化驱动器

mod error;
mod facade;
pub mod kinematics;

pub use error::ControlError;
pub use facade::{ControlConfig, ControlFacade, DEFAULT_INIT_DELAY};
pub use kinematics::{StageGeometry, solve, solve_degrees};
