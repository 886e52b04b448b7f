//! 逆运动学
//!
//! 平台由两根直线推杆支撑。给定两个倾角，求两根推杆相对中位的伸缩量。
//!
//! 旋转矩阵（θ 为主倾角，γ 为副倾角）：
//!
//! ```text
//! T = | cosθ   sinθ·sinγ   sinθ·cosγ |
//!     | 0      cosγ        -sinγ     |
//!     | -sinθ  cosθ·sinγ   cosθ·cosγ |
//! ```
//!
//! 平台铰点 q1=(r,0,0)、q2=(0,r,0) 经 `u = T·q + (0,0,h0)` 变换，
//! 底座铰点 p1=(R,0,0)、p2=(0,R,0)，推杆伸缩量为 `‖u - p‖ - L0`。

use nalgebra::{Matrix3, Vector3};

/// 台体几何参数（单位：mm）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageGeometry {
    /// 平台铰点半径 r
    pub platform_radius: f64,
    /// 底座铰点半径 R
    pub base_radius: f64,
    /// 中位时平台高度 h0
    pub neutral_height: f64,
    /// 中位推杆长度 L0
    pub neutral_leg_length: f64,
}

impl StageGeometry {
    /// 实际台体参数
    pub const DEFAULT: Self = Self {
        platform_radius: 189.04,
        base_radius: 306.25,
        neutral_height: 831.278,
        neutral_leg_length: 839.5,
    };

    /// 倾角对应的旋转矩阵
    pub fn rotation(theta: f64, gamma: f64) -> Matrix3<f64> {
        let (st, ct) = theta.sin_cos();
        let (sg, cg) = gamma.sin_cos();
        Matrix3::new(
            ct, st * sg, st * cg, //
            0.0, cg, -sg, //
            -st, ct * sg, ct * cg,
        )
    }

    /// 求两根推杆的伸缩量 `(delta1, delta2)`
    ///
    /// 输入为弧度，不做限幅；任意实数输入都有定义。
    pub fn solve(&self, theta: f64, gamma: f64) -> (f64, f64) {
        let t = Self::rotation(theta, gamma);
        let translation = Vector3::new(0.0, 0.0, self.neutral_height);

        let r = self.platform_radius;
        let big_r = self.base_radius;
        let legs = [
            (Vector3::new(r, 0.0, 0.0), Vector3::new(big_r, 0.0, 0.0)),
            (Vector3::new(0.0, r, 0.0), Vector3::new(0.0, big_r, 0.0)),
        ];

        let [d1, d2] = legs.map(|(q, p)| {
            let u = t * q + translation;
            (u - p).norm() - self.neutral_leg_length
        });
        (d1, d2)
    }
}

impl Default for StageGeometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// 使用默认几何求解（弧度）
pub fn solve(theta: f64, gamma: f64) -> (f64, f64) {
    StageGeometry::DEFAULT.solve(theta, gamma)
}

/// 使用默认几何求解（角度）
pub fn solve_degrees(alpha_deg: f64, beta_deg: f64) -> (f64, f64) {
    solve(alpha_deg.to_radians(), beta_deg.to_radians())
}
