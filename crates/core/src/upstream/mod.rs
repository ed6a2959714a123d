//! External promotion site client.

mod http;
mod types;

pub use http::HttpPromotionApi;
pub use types::{ApiError, PromotionApi};
