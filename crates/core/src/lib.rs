pub mod config;
pub mod engine;
pub mod extraction;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod pool;
pub mod selector;
pub mod testing;
pub mod upstream;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    NotifierConfig, SanitizedConfig, ServerConfig, UpstreamConfig,
};
pub use engine::{
    AutoStartConfig, EngineConfig, EngineError, EngineStatus, JobScheduler, PromotionEngine,
};
pub use ledger::{LedgerStats, SqliteTokenLedger, Token, TokenLedger, TokenStatus};
pub use notify::{LogNotifier, Notifier, WebhookNotifier};
pub use pipeline::{Outcome, PipelineStep, PromotionPipeline};
pub use pool::{Account, AccountPool, Policy, PoolError, SqliteTenantStore, Tenant, TenantStore};
pub use upstream::{ApiError, HttpPromotionApi, PromotionApi};
