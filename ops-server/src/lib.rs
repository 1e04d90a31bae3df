//! Ops Server - 屠宰场运营核心
//!
//! # 架构概述
//!
//! - **分配器** (`allocator`): 按动物类型生成连续、不可重复的标识符
//! - **数量账本** (`ledger`): 只追加的产品数量事件
//! - **库存投影** (`stock`): 由账本重放得到当前库存，带缓存
//! - **发货聚合** (`shipments`): 原子发货、收货比对
//! - **广播中心** (`message`): station 快照 + 有序增量推送
//! - **分页规划** (`pagination`): 列表分页与分组
//! - **存储** (`storage`): 嵌入式 redb
//!
//! # 模块结构
//!
//! ```text
//! ops-server/src/
//! ├── core/          # 配置、状态
//! ├── ops/           # OpsService 门面、错误、键锁
//! ├── allocator/     # 标识符分配
//! ├── ledger/        # 数量账本、屠宰登记
//! ├── stock/         # 库存投影
//! ├── shipments/     # 发货
//! ├── message/       # 广播中心、station 队列、传输
//! ├── pagination.rs  # 分页规划
//! ├── storage.rs     # redb 存储层
//! └── utils/         # 日志、重试
//! ```

pub mod allocator;
pub mod core;
pub mod ledger;
pub mod message;
pub mod ops;
pub mod pagination;
pub mod shipments;
pub mod stock;
pub mod storage;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, ServerState};
pub use message::{BroadcastHub, MemoryTransport, StationStream, Transport, serve_station};
pub use ops::{ErrorKind, OpsConfig, OpsError, OpsResult, OpsService};
pub use pagination::PaginationPlan;
pub use storage::{OpsStorage, StorageError};

pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置进程环境：加载 .env，初始化日志
pub fn setup_environment() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::from_env();
    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir)?;
    }
    init_logger_with_file(Some(&config.log_level), config.log_dir.as_deref());
    Ok(())
}
