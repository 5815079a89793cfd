use std::net::{IpAddr, SocketAddr};

use kvguard::{
    AppState, cache::Notification, config::Config, connect_store, routes,
    routes::cache::INVALIDATION_CHANNEL,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 建立存储连接
    let store = connect_store(&config)
        .await
        .expect("Failed to connect to store");

    // 设置应用状态
    let state = AppState::new(config.clone(), store.clone());

    // 订阅缓存失效通知，便于观察其他实例的失效操作
    if let Err(e) = state
        .notifier
        .subscribe(INVALIDATION_CHANNEL, |n: &Notification| {
            tracing::info!(
                channel = %n.channel,
                payload = n.payload_str().unwrap_or("<binary>"),
                "Cache invalidation notice"
            );
        })
        .await
    {
        tracing::warn!(error = %e, "Failed to subscribe to cache invalidation notices");
    }

    let router = routes::router(state.clone()).expect("Invalid middleware configuration");

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 释放订阅连接
    store.close().await;
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
