use std::sync::Arc;
use bumper_core::{
    Config, PromotionEngine, SanitizedConfig, TenantStore, TokenLedger,
};

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn TenantStore>,
    ledger: Arc<dyn TokenLedger>,
    engine: Arc<PromotionEngine>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn TenantStore>,
        ledger: Arc<dyn TokenLedger>,
        engine: Arc<PromotionEngine>,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            engine,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn TenantStore {
        self.store.as_ref()
    }

    pub fn ledger(&self) -> &dyn TokenLedger {
        self.ledger.as_ref()
    }

    pub fn engine(&self) -> &Arc<PromotionEngine> {
        &self.engine
    }

    pub fn default_daily_cap(&self) -> u32 {
        self.config.engine.default_daily_cap
    }
}
