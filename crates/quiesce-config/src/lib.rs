pub mod global;
pub mod loader;

pub use global::{GlobalConfig, SystemConfig};
pub use loader::ConfigLoader;
