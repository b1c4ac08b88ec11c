//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志与链路追踪的初始化。

use crate::error::{Result, SyncError};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化 tracing
///
/// 日志级别优先取 `RUST_LOG`，否则使用 `default_filter`（通常来自 `global.log_filter`）。
/// 同时挂上 OpenTelemetry layer；未配置导出器时 span 不会离开进程。
///
/// # 参数
///
/// * `service_name` - 服务名称，作为 tracer 名称
/// * `default_filter` - 默认过滤规则，例如 "info,xpsync=debug"
///
/// # 返回值
///
/// 已有全局 subscriber 时返回配置错误
pub fn init_tracing(service_name: &str, default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| SyncError::ConfigError(format!("invalid log filter: {}", e)))?;

    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());
    let telemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(telemetry);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| SyncError::ConfigError(format!("tracing already initialized: {}", e)))
}

/// 刷新并关闭全局 tracer provider
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
