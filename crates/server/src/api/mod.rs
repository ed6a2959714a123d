pub mod accounts;
pub mod engine;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod routes;
pub mod tenants;

pub use routes::create_router;
