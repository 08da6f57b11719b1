pub mod subscriber;

pub use subscriber::{init_logging, parse_filter, LoggingConfig, LoggingError};
