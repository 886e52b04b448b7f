//! 求解命令
//!
//! 只做逆运动学计算，不连接总线。

use anyhow::Result;
use clap::Args;
use tiltstage_control::solve_degrees;

/// 输入角度范围（±度）
pub const MAX_ANGLE_DEG: f64 = 45.0;

/// 目标倾角（度）
#[derive(Args, Debug, Clone, Copy)]
pub struct AngleArgs {
    /// 主倾角 α（度，-45 ~ 45）
    #[arg(short, long, allow_negative_numbers = true)]
    pub alpha: f64,

    /// 副倾角 β（度，-45 ~ 45）
    #[arg(short = 'g', long, allow_negative_numbers = true)]
    pub beta: f64,
}

impl AngleArgs {
    /// 输入按 0.1° 取整
    pub fn rounded(&self) -> (f64, f64) {
        let round = |v: f64| (v * 10.0).round() / 10.0;
        (round(self.alpha), round(self.beta))
    }

    /// 先取整再检查范围，返回取整后的角度
    pub fn validated(&self) -> Result<(f64, f64)> {
        let (alpha, beta) = self.rounded();
        for (name, value) in [("alpha", alpha), ("beta", beta)] {
            if !value.is_finite() || value.abs() > MAX_ANGLE_DEG {
                anyhow::bail!(
                    "{} = {} 超出范围 [-{}, {}]",
                    name,
                    value,
                    MAX_ANGLE_DEG,
                    MAX_ANGLE_DEG
                );
            }
        }
        Ok((alpha, beta))
    }
}

/// 打印两根推杆的伸缩量
pub fn print_displacements(delta1: f64, delta2: f64) {
    println!("  电机 1 推杆伸缩量: {:.2} mm", delta1);
    println!("  电机 2 推杆伸缩量: {:.2} mm", delta2);
}

/// 求解命令参数
#[derive(Args, Debug)]
pub struct SolveCommand {
    #[command(flatten)]
    pub angles: AngleArgs,
}

impl SolveCommand {
    pub fn execute(&self) -> Result<()> {
        let (alpha, beta) = self.angles.validated()?;

        let (delta1, delta2) = solve_degrees(alpha, beta);
        println!("α = {:.1}°, β = {:.1}°", alpha, beta);
        print_displacements(delta1, delta2);
        Ok(())
    }
}
