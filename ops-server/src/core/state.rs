use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::ops::OpsService;
use crate::storage::OpsStorage;

/// 服务状态 - 持有运营核心的共享引用
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | ops | Arc<OpsService> | 运营核心 |
/// | shutdown | CancellationToken | 关闭信号，传给各 station 传输任务 |
#[derive(Clone, Debug)]
pub struct ServerState {
    pub config: Config,
    pub ops: Arc<OpsService>,
    pub shutdown: CancellationToken,
}

impl ServerState {
    /// 初始化服务状态
    ///
    /// 1. 确保工作目录存在
    /// 2. 打开数据库 (work_dir/db_file)
    /// 3. 组装运营核心
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)
            .with_context(|| format!("failed to create work dir {}", config.work_dir))?;

        let db_path = config.db_path();
        let storage = OpsStorage::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        let stats = storage.get_stats()?;
        tracing::info!(
            path = %db_path.display(),
            animal_types = stats.animal_types,
            products = stats.products,
            events = stats.events,
            shipments = stats.shipments,
            "Database opened"
        );

        Ok(Self {
            config: config.clone(),
            ops: Arc::new(OpsService::new(storage, config.ops_config())),
            shutdown: CancellationToken::new(),
        })
    }

    /// 通知所有后台任务退出并关闭 station 会话
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.ops.shutdown();
    }
}
