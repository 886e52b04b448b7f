//! 配置管理命令
//!
//! 持久化默认接口名称与波特率（TOML）。

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tiltstage_driver::DEFAULT_BITRATE;

/// 默认 CAN 接口
pub const DEFAULT_INTERFACE: &str = "can0";

/// 接口名最大长度（IFNAMSIZ - 1）
const MAX_IFACE_NAME_LEN: usize = 15;

/// 默认配置文件路径
fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("tiltstage");
    path.push("config.toml");
    Ok(path)
}

/// 解析配置文件路径（`--config` 优先）
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_file(),
    }
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// 默认 CAN 接口
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// 默认波特率（bps）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
}

impl CliConfig {
    /// 加载配置（文件不存在时返回默认配置）
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }

        let body = toml::to_string_pretty(self).context("序列化配置失败")?;
        let content = format!("# Tiltstage CLI Configuration\n\n{}", body);
        fs::write(path, content).context("写入配置文件失败")?;
        Ok(())
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or(DEFAULT_INTERFACE)
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate.unwrap_or(DEFAULT_BITRATE)
    }

    /// 检查配置项，返回所有问题
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let iface = self.interface();
        if iface.is_empty() || iface.len() > MAX_IFACE_NAME_LEN {
            problems.push(format!(
                "接口名 '{}' 长度必须在 1..={} 之间",
                iface, MAX_IFACE_NAME_LEN
            ));
        }
        if self.bitrate() == 0 {
            problems.push("波特率必须为正整数".to_string());
        }
        problems
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// CAN 接口名称（如 can0）
        #[arg(short, long)]
        interface: Option<String>,

        /// 波特率（bps）
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        bitrate: Option<u32>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（interface / bitrate / all）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set { interface, bitrate } => Self::set_(path, interface, bitrate),
            ConfigCommand::Get { key } => Self::get_(path, &key),
            ConfigCommand::Check => Self::check_(path),
        }
    }

    fn set_(path: &Path, interface: Option<String>, bitrate: Option<u32>) -> Result<()> {
        let mut config = CliConfig::load(path)?;

        if let Some(iface) = interface {
            println!("✅ 设置默认接口: {}", iface);
            config.interface = Some(iface);
        }

        if let Some(bitrate) = bitrate {
            println!("✅ 设置默认波特率: {}", bitrate);
            config.bitrate = Some(bitrate);
        }

        config.save(path)
    }

    fn get_(path: &Path, key: &str) -> Result<()> {
        let config = CliConfig::load(path)?;

        match key {
            "interface" => println!("{}", config.interface()),
            "bitrate" => println!("{}", config.bitrate()),
            "all" => {
                println!("Tiltstage CLI 配置:");
                println!("  接口: {}", config.interface());
                println!("  波特率: {}", config.bitrate());
            },
            other => anyhow::bail!("未知配置项: {}（可选 interface / bitrate / all）", other),
        }

        Ok(())
    }

    fn check_(path: &Path) -> Result<()> {
        let config = CliConfig::load(path)?;

        println!("配置文件: {}", path.display());
        if !path.exists() {
            println!("  (文件不存在，使用默认值)");
        }
        println!("  接口: {}", config.interface());
        println!("  波特率: {}", config.bitrate());

        let problems = config.problems();
        if problems.is_empty() {
            println!("✅ 配置有效");
            Ok(())
        } else {
            for problem in &problems {
                println!("  ❌ {}", problem);
            }
            anyhow::bail!("配置无效（{} 个问题）", problems.len())
        }
    }
}
