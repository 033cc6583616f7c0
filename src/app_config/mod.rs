pub mod engine_config;
pub mod env;
pub mod log;

pub use engine_config::{EngineConfig, MartingaleRuntimeConfig, SchedulerConfig};
