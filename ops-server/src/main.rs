use ops_server::{Config, ServerState, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 日志)
    setup_environment()?;

    tracing::info!("Ops server starting...");

    // 2. 加载配置
    let config = Config::from_env();

    // 3. 初始化服务状态 (打开数据库、组装运营核心)
    let state = ServerState::initialize(&config)?;
    tracing::info!(
        work_dir = %config.work_dir,
        environment = %config.environment,
        lock_timeout_ms = config.lock_timeout_ms,
        station_queue_capacity = config.station_queue_capacity,
        "Ops core ready"
    );

    // 4. 等待退出信号
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    state.shutdown();

    Ok(())
}
