use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app_config::env::{env_f64, env_i64, env_is_true, env_or_default, env_u64};
use crate::error::{AppError, AppResult};
use crate::time_util::local_offset_minutes;
use crate::trading::model::{
    BreakWarningPolicy, BreakWarningSettings, TradingGoalsSettings, TradingLimitsSettings,
};

/// 信号调度参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// 每次计算使用的K线数量
    pub candle_window: usize,
    /// 收盘后等待行情落地的时间
    pub settle_delay_ms: u64,
    /// 行情异常后的重试间隔
    pub retry_delay_ms: u64,
    /// 行情过期(收盘时间已过)时的退避间隔
    pub stale_backoff_ms: u64,
    /// 连续失败多少次后暂停该资产
    pub max_consecutive_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            candle_window: 100,
            settle_delay_ms: 5_000,
            retry_delay_ms: 10_000,
            stale_backoff_ms: 10_000,
            max_consecutive_failures: 3,
        }
    }
}

/// 马丁链运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MartingaleRuntimeConfig {
    /// 持仓到期后超过该时长才处理的亏损不再加仓
    pub chain_timeout_ms: i64,
    /// 终态链的保留时长
    pub chain_retention_ms: i64,
    /// 下单金额保留的小数位
    pub stake_precision: u32,
}

impl Default for MartingaleRuntimeConfig {
    fn default() -> Self {
        Self {
            chain_timeout_ms: 60_000,
            chain_retention_ms: 3_600_000,
            stake_precision: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub signal_bus_capacity: usize,
    pub martingale: MartingaleRuntimeConfig,
    pub order_retention_ms: i64,
    pub outcome_poll_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    pub persist_interval_ms: u64,
    /// 交易日所用的时区偏移 (分钟)
    pub utc_offset_minutes: i32,
    /// 武装一个资产时撤销其它资产的武装
    pub exclusive_arming: bool,
    pub snapshot_path: Option<PathBuf>,
    pub trading_limits: TradingLimitsSettings,
    pub trading_goals: TradingGoalsSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            signal_bus_capacity: 64,
            martingale: MartingaleRuntimeConfig::default(),
            order_retention_ms: 3_600_000,
            outcome_poll_interval_ms: 2_000,
            cleanup_interval_ms: 3_600_000,
            persist_interval_ms: 5_000,
            utc_offset_minutes: local_offset_minutes(),
            exclusive_arming: false,
            snapshot_path: None,
            trading_limits: TradingLimitsSettings::default(),
            trading_goals: TradingGoalsSettings::default(),
        }
    }
}

fn parse_policy(name: &str, ratio: f64) -> BreakWarningPolicy {
    match name.trim().to_lowercase().as_str() {
        "loss_ratio" | "ratio" => BreakWarningPolicy::LossRatio { ratio },
        "consecutive" | "consecutive_losses" => BreakWarningPolicy::ConsecutiveLosses,
        _ => BreakWarningPolicy::LossCount,
    }
}

impl EngineConfig {
    /// 从 AUTOTRADE_* 环境变量加载，缺失或非法时使用默认值
    pub fn from_env() -> AppResult<Self> {
        let d = Self::default();
        let bw = &d.trading_limits.break_warning;

        let snapshot_path = env_or_default("AUTOTRADE_SNAPSHOT_PATH", "");
        let config = Self {
            scheduler: SchedulerConfig {
                candle_window: env_u64(
                    "AUTOTRADE_CANDLE_WINDOW",
                    d.scheduler.candle_window as u64,
                ) as usize,
                settle_delay_ms: env_u64("AUTOTRADE_SETTLE_DELAY_MS", d.scheduler.settle_delay_ms),
                retry_delay_ms: env_u64("AUTOTRADE_RETRY_DELAY_MS", d.scheduler.retry_delay_ms),
                stale_backoff_ms: env_u64(
                    "AUTOTRADE_STALE_BACKOFF_MS",
                    d.scheduler.stale_backoff_ms,
                ),
                max_consecutive_failures: env_u64(
                    "AUTOTRADE_MAX_CONSECUTIVE_FAILURES",
                    d.scheduler.max_consecutive_failures as u64,
                ) as u32,
            },
            signal_bus_capacity: env_u64(
                "AUTOTRADE_SIGNAL_BUS_CAPACITY",
                d.signal_bus_capacity as u64,
            ) as usize,
            martingale: MartingaleRuntimeConfig {
                chain_timeout_ms: env_i64(
                    "AUTOTRADE_CHAIN_TIMEOUT_MS",
                    d.martingale.chain_timeout_ms,
                ),
                chain_retention_ms: env_i64(
                    "AUTOTRADE_CHAIN_RETENTION_MS",
                    d.martingale.chain_retention_ms,
                ),
                stake_precision: env_u64(
                    "AUTOTRADE_STAKE_PRECISION",
                    d.martingale.stake_precision as u64,
                ) as u32,
            },
            order_retention_ms: env_i64("AUTOTRADE_ORDER_RETENTION_MS", d.order_retention_ms),
            outcome_poll_interval_ms: env_u64(
                "AUTOTRADE_OUTCOME_POLL_INTERVAL_MS",
                d.outcome_poll_interval_ms,
            ),
            cleanup_interval_ms: env_u64("AUTOTRADE_CLEANUP_INTERVAL_MS", d.cleanup_interval_ms),
            persist_interval_ms: env_u64("AUTOTRADE_PERSIST_INTERVAL_MS", d.persist_interval_ms),
            utc_offset_minutes: env_i64(
                "AUTOTRADE_UTC_OFFSET_MINUTES",
                d.utc_offset_minutes as i64,
            ) as i32,
            exclusive_arming: env_is_true("AUTOTRADE_EXCLUSIVE_ARMING", d.exclusive_arming),
            snapshot_path: (!snapshot_path.trim().is_empty()).then(|| PathBuf::from(snapshot_path)),
            trading_limits: TradingLimitsSettings {
                break_warning: BreakWarningSettings {
                    enabled: env_is_true("AUTOTRADE_BREAK_WARNING_ENABLED", bw.enabled),
                    time_window_minutes: env_i64(
                        "AUTOTRADE_BREAK_WARNING_WINDOW_MINUTES",
                        bw.time_window_minutes,
                    ),
                    min_orders_required: env_u64(
                        "AUTOTRADE_BREAK_WARNING_MIN_ORDERS",
                        bw.min_orders_required as u64,
                    ) as usize,
                    loss_threshold: env_u64(
                        "AUTOTRADE_BREAK_WARNING_LOSS_THRESHOLD",
                        bw.loss_threshold as u64,
                    ) as usize,
                    pause_auto_trade: env_is_true(
                        "AUTOTRADE_BREAK_WARNING_PAUSE_AUTO_TRADE",
                        bw.pause_auto_trade,
                    ),
                    pause_duration_minutes: env_i64(
                        "AUTOTRADE_BREAK_WARNING_PAUSE_MINUTES",
                        bw.pause_duration_minutes,
                    ),
                    policy: parse_policy(
                        &env_or_default("AUTOTRADE_BREAK_WARNING_POLICY", "loss_count"),
                        env_f64("AUTOTRADE_BREAK_WARNING_LOSS_RATIO", 0.6),
                    ),
                },
            },
            trading_goals: TradingGoalsSettings {
                profit_target_percentage: env_f64(
                    "AUTOTRADE_PROFIT_TARGET_PCT",
                    d.trading_goals.profit_target_percentage,
                ),
                loss_limit_percentage: env_f64(
                    "AUTOTRADE_LOSS_LIMIT_PCT",
                    d.trading_goals.loss_limit_percentage,
                ),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let checks: [(bool, &str); 8] = [
            (self.scheduler.candle_window > 0, "candle_window 必须大于 0"),
            (self.signal_bus_capacity > 0, "signal_bus_capacity 必须大于 0"),
            (self.martingale.chain_timeout_ms > 0, "chain_timeout_ms 必须大于 0"),
            (self.outcome_poll_interval_ms > 0, "outcome_poll_interval_ms 必须大于 0"),
            (self.cleanup_interval_ms > 0, "cleanup_interval_ms 必须大于 0"),
            (self.persist_interval_ms > 0, "persist_interval_ms 必须大于 0"),
            (
                self.trading_limits.break_warning.time_window_minutes > 0,
                "break_warning.time_window_minutes 必须大于 0",
            ),
            (
                self.trading_goals.profit_target_percentage >= 0.0
                    && self.trading_goals.loss_limit_percentage >= 0.0,
                "目标百分比不能为负数",
            ),
        ];
        for (ok, msg) in checks {
            if !ok {
                return Err(AppError::Config(msg.to_string()));
            }
        }
        if let BreakWarningPolicy::LossRatio { ratio } = self.trading_limits.break_warning.policy {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(AppError::Config(format!("loss ratio 超出范围: {}", ratio)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.candle_window, 100);
        assert_eq!(config.martingale.chain_timeout_ms, 60_000);
        assert_eq!(config.trading_limits.break_warning.min_orders_required, 7);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = EngineConfig::default();
        config.scheduler.candle_window = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = EngineConfig::default();
        config.trading_limits.break_warning.policy = BreakWarningPolicy::LossRatio { ratio: 1.5 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(
            parse_policy("Loss_Ratio", 0.5),
            BreakWarningPolicy::LossRatio { ratio: 0.5 }
        );
        assert_eq!(
            parse_policy("consecutive", 0.5),
            BreakWarningPolicy::ConsecutiveLosses
        );
        assert_eq!(parse_policy("???", 0.5), BreakWarningPolicy::LossCount);
    }
}
