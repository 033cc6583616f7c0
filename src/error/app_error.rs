use thiserror::Error;

/// 应用错误
///
/// 对应四类错误：行情错误(可重试)、下单错误(本次放弃)、
/// 不变量破坏(逻辑缺陷，记录 error 日志)、以及持久化/配置等基础设施错误。
/// 安全拦截(超时、日内目标、休息提醒)不是错误，不在这里出现。
#[derive(Error, Debug)]
pub enum AppError {
    /// K线获取失败
    #[error("行情错误: asset_id={asset_id}, {reason}")]
    Feed { asset_id: i64, reason: String },

    /// 下单失败(余额不足、无可交易合约、券商拒单)
    #[error("下单失败: asset_id={asset_id}, {reason}")]
    OrderPlacement { asset_id: i64, reason: String },

    #[error("余额账户不存在: {0}")]
    BalanceNotFound(i64),

    #[error("余额不足: balance_id={balance_id}, 需要={required}, 可用={available}")]
    InsufficientBalance {
        balance_id: i64,
        required: f64,
        available: f64,
    },

    #[error("资产未配置自动交易: {0}")]
    AssetNotConfigured(i64),

    /// 不变量被破坏(重复链、重入创建等)
    #[error("不变量破坏: {0}")]
    InvariantViolation(String),

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    /// 未知错误
    #[error("未知错误: {0}")]
    Unknown(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// 外部平台返回的 anyhow 错误转换为下单错误
    pub fn order_placement(asset_id: i64, err: &anyhow::Error) -> Self {
        AppError::OrderPlacement {
            asset_id,
            reason: err.to_string(),
        }
    }

    /// 外部平台返回的 anyhow 错误转换为行情错误
    pub fn feed(asset_id: i64, err: &anyhow::Error) -> Self {
        AppError::Feed {
            asset_id,
            reason: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Unknown(e.to_string())
    }
}
