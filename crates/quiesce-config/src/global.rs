use quiesce_logging::LoggingConfig;
use quiesce_shutdown::CloseConfig;
use serde::{Deserialize, Serialize};

/// 全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub close: CloseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 系统配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemConfig {
    pub name: String,
    pub version: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "quiesce".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
