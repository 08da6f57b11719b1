use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 有界关闭配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CloseConfig {
    /// 上下文无截止时间时的等待窗口（毫秒）
    #[serde(default = "default_window_ms")]
    pub default_window_ms: u64,

    /// 有截止时间时追加的安全余量（毫秒），使上下文过期先于超时被观察到
    #[serde(default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,
}

fn default_window_ms() -> u64 {
    1000
}

fn default_safety_margin_ms() -> u64 {
    10
}

impl CloseConfig {
    pub fn default_window(&self) -> Duration {
        Duration::from_millis(self.default_window_ms)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_millis(self.safety_margin_ms)
    }
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            default_window_ms: default_window_ms(),
            safety_margin_ms: default_safety_margin_ms(),
        }
    }
}
