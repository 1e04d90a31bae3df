//! 工具模块 - 日志与重试

pub mod logger;
pub mod retry;

pub use logger::{init_logger, init_logger_with_file};
pub use retry::{RetryPolicy, retry_with_backoff};
