use anyhow::{anyhow, Result};
use config::{Config, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::GlobalConfig;

/// 配置文件名
pub const CONFIG_FILE: &str = "quiesce.toml";

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// 加载全局配置
    pub fn load_global(&self) -> Result<GlobalConfig> {
        let config_path = self.config_path();

        if !config_path.exists() {
            // 如果配置文件不存在，返回默认配置
            return Ok(GlobalConfig::default());
        }

        let config = Config::builder()
            .add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// 加载并验证配置
    pub fn load_validated(&self) -> Result<GlobalConfig> {
        let global = self.load_global()?;
        Self::check(&global)?;
        Ok(global)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        let global = self.load_global()?;
        Self::check(&global)
    }

    fn check(global: &GlobalConfig) -> Result<()> {
        if global.close.default_window_ms == 0 {
            return Err(anyhow!("default_window_ms must be greater than 0"));
        }

        if global.close.safety_margin_ms >= global.close.default_window_ms {
            return Err(anyhow!(
                "safety_margin_ms ({}) must be smaller than default_window_ms ({})",
                global.close.safety_margin_ms,
                global.close.default_window_ms
            ));
        }

        quiesce_logging::parse_filter(&global.logging.level)?;

        Ok(())
    }
}
