pub mod app;
pub mod app_config;
pub mod error;
pub mod job;
pub mod time_util;
pub mod trading;
