mod config;
mod runner;
mod scheduler;
mod types;

pub use config::{parse_clock_time, AutoStartConfig, EngineConfig};
pub use runner::PromotionEngine;
pub use scheduler::{JobKey, JobScheduler, SchedulerError};
pub use types::{CycleInfo, EngineError, EngineStatus, JobKind};
