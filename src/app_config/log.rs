use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::app_config::env::{env_is_true, env_or_default};

// 全局变量用于保持日志文件句柄
static INFO_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ERROR_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

// 日志配置结构体
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub app_env: String,
    pub log_level: String,
    pub log_dir: String,
    pub log_rotation: String,
    pub info_file_name: String,
    pub error_file_name: String,
    pub enable_console_logging: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            app_env: env_or_default("APP_ENV", "local"),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_dir: env_or_default("LOG_DIR", "log_files"),
            log_rotation: env_or_default("LOG_ROTATION", "daily"),
            info_file_name: env_or_default("LOG_INFO_FILE", "info.log"),
            error_file_name: env_or_default("LOG_ERROR_FILE", "error.log"),
            enable_console_logging: env_is_true("ENABLE_CONSOLE_LOGGING", true),
        }
    }

    pub fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("local")
    }
}

// 解析时间轮转策略
fn parse_rotation(s: &str) -> Rotation {
    match s.to_lowercase().as_str() {
        "minutely" | "minute" | "min" => Rotation::MINUTELY,
        "hourly" | "hour" | "hr" => Rotation::HOURLY,
        "daily" | "day" => Rotation::DAILY,
        _ => Rotation::DAILY,
    }
}

// 设置日志
pub fn setup_logging() -> anyhow::Result<()> {
    let config = LogConfig::from_env();

    // 本地环境：仅控制台输出
    if config.is_local() {
        let subscriber = Registry::default().with(
            fmt::layer()
                .with_ansi(true)
                .with_target(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .with_writer(std::io::stdout)
                .with_filter(EnvFilter::new(&config.log_level)),
        );
        tracing::subscriber::set_global_default(subscriber)?;
        info!(
            "日志初始化完成: env={}, level={}, 文件日志=false",
            config.app_env, config.log_level
        );
        return Ok(());
    }

    // 非本地环境：文件输出（可选控制台）
    std::fs::create_dir_all(&config.log_dir).map_err(|e| {
        anyhow::anyhow!("Failed to create log directory '{}': {}", config.log_dir, e)
    })?;

    let info_file = RollingFileAppender::new(
        parse_rotation(&config.log_rotation),
        &config.log_dir,
        &config.info_file_name,
    );
    let error_file = RollingFileAppender::new(
        parse_rotation(&config.log_rotation),
        &config.log_dir,
        &config.error_file_name,
    );

    let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
    let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);

    // 保存guard到全局，防止被丢弃
    INFO_GUARD
        .set(info_guard)
        .map_err(|_| anyhow::anyhow!("Failed to set INFO_GUARD"))?;
    ERROR_GUARD
        .set(error_guard)
        .map_err(|_| anyhow::anyhow!("Failed to set ERROR_GUARD"))?;

    let console = config.enable_console_logging.then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stdout)
            .with_filter(EnvFilter::new(&config.log_level))
    });

    let subscriber = Registry::default()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .with_writer(info_non_blocking)
                .with_filter(EnvFilter::new(&config.log_level)),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_level(true)
                .with_writer(error_non_blocking)
                .with_filter(EnvFilter::new("error")),
        )
        .with(console);
    tracing::subscriber::set_global_default(subscriber)?;

    info!(
        "日志初始化完成: env={}, level={}, dir={}, rotation={}, 控制台={}",
        config.app_env,
        config.log_level,
        config.log_dir,
        config.log_rotation,
        config.enable_console_logging
    );
    Ok(())
}
