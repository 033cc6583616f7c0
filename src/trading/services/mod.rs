pub mod notification;
pub mod paper_client;
pub mod platform_client;

pub use notification::{
    MemoryNotificationSink, Notification, NotificationSink, Notifier, Severity,
    TelegramNotificationSink, TracingNotificationSink,
};
pub use paper_client::PaperTradingClient;
pub use platform_client::TradingPlatformClient;
