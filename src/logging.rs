//! 日志初始化 (tracing + tracing-subscriber)

use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化全局日志
///
/// - `log_level`: 默认级别 ("info", "debug" ...), `RUST_LOG` 优先
/// - `json_format`: 输出 JSON 行
///
/// 重复初始化 (例如测试中) 会被忽略, 返回 false
pub fn init_logging(log_level: &str, json_format: bool) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let result = if json_format {
        subscriber.with(fmt::layer().json()).try_init()
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_line_number(true),
            )
            .try_init()
    };

    if result.is_ok() {
        info!(
            "Logging initialized: level={}, format={}",
            log_level,
            if json_format { "json" } else { "text" }
        );
    }
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let _ = init_logging("debug", false);
        // 第二次一定失败, 但不能 panic
        assert!(!init_logging("info", true));
        tracing::info!("still logging");
    }
}
