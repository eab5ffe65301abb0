//! 主应用程序入口
//!
//! 加载配置、连接 Redis，并启动长连接网关。

use std::sync::Arc;

use application::{KvStore, MessageCache, SequenceAllocator, SignalInviteQueue};
use config::AppConfig;
use infrastructure::RedisStore;
use msg_gateway::{router, GatewayState, StoreBackedHandler};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "配置已加载");

    let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&config.redis.url).await?);

    let handler = StoreBackedHandler::new(
        Arc::new(SequenceAllocator::new(store.clone())),
        Arc::new(MessageCache::new(
            store.clone(),
            config.cache.msg_cache_timeout(),
        )),
        Arc::new(SignalInviteQueue::new(store, config.cache.signal_timeout())),
    );
    let state = GatewayState::start(Arc::new(handler), config.gateway.write_timeout());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;

    tracing::info!("长连接网关启动在 ws://{}/ws", config.listen_addr());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "监听退出信号失败");
            }
        })
        .await?;

    Ok(())
}
