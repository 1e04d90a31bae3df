use std::path::PathBuf;
use std::time::Duration;

use crate::ops::OpsConfig;

/// 服务配置 - 运营核心的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (存放数据库文件) |
/// | DB_FILE | ops.redb | 数据库文件名 |
/// | LOCK_TIMEOUT_MS | 2000 | 串行化点等待上限(毫秒) |
/// | STATION_QUEUE_CAPACITY | 256 | 每个 station 的发送队列上限 |
/// | ERROR_LOG_TAIL | 50 | 快照中包含的错误日志条数 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | (未设置) | 滚动日志目录 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/ops LOCK_TIMEOUT_MS=500 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录
    pub work_dir: String,
    /// 数据库文件名 (相对 work_dir)
    pub db_file: String,
    /// 串行化点等待上限 (毫秒)
    pub lock_timeout_ms: u64,
    pub station_queue_capacity: usize,
    pub error_log_tail: usize,
    pub log_level: String,
    /// 滚动日志目录，未设置时只输出到 stdout
    pub log_dir: Option<String>,
    /// 运行环境: development | production
    pub environment: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            db_file: std::env::var("DB_FILE").unwrap_or_else(|_| "ops.redb".into()),
            lock_timeout_ms: env_or("LOCK_TIMEOUT_MS", 2000),
            station_queue_capacity: env_or("STATION_QUEUE_CAPACITY", 256),
            error_log_tail: env_or("ERROR_LOG_TAIL", 50),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用指定工作目录，其余取环境变量
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// 数据库文件完整路径
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join(&self.db_file)
    }

    pub fn ops_config(&self) -> OpsConfig {
        OpsConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            station_queue_capacity: self.station_queue_capacity.max(1),
            error_log_tail: self.error_log_tail,
        }
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_ops_config() {
        let mut config = Config::with_work_dir("/tmp/ops");
        config.db_file = "test.redb".to_string();
        config.lock_timeout_ms = 150;
        config.station_queue_capacity = 0;

        assert_eq!(config.db_path(), PathBuf::from("/tmp/ops/test.redb"));
        let ops = config.ops_config();
        assert_eq!(ops.lock_timeout, Duration::from_millis(150));
        assert_eq!(ops.station_queue_capacity, 1);
    }

    #[test]
    fn test_env_or_fallback() {
        assert_eq!(env_or("OPS_TEST_UNSET_VARIABLE", 42u64), 42);
    }
}
