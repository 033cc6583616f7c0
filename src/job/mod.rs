pub mod maintenance_job;
pub mod outcome_job;
pub mod task_scheduler;

pub use maintenance_job::{persist, run_cleanup, CleanupReport};
pub use outcome_job::{OutcomeProcessor, OutcomeReport};
pub use task_scheduler::TaskScheduler;
