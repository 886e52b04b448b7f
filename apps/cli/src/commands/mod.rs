//! 命令定义和实现

pub mod config;
pub mod solve;

#[cfg(target_os = "linux")]
pub mod check;
#[cfg(target_os = "linux")]
pub mod monitor;
#[cfg(target_os = "linux")]
pub mod r#move;

pub use config::ConfigCommand;
pub use solve::SolveCommand;

#[cfg(target_os = "linux")]
pub use check::CheckCommand;
#[cfg(target_os = "linux")]
pub use monitor::MonitorCommand;
#[cfg(target_os = "linux")]
pub use r#move::MoveCommand;
