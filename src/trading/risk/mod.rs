pub mod break_warning_monitor;
pub mod daily_goal_tracker;

pub use break_warning_monitor::BreakWarningMonitor;
pub use daily_goal_tracker::DailyGoalTracker;
