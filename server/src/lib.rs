//! WhatsApp lead-qualification bot: walks customers through a per-tenant
//! decision tree over the WhatsApp Cloud API webhook, then hands off to a human.

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod signature;
pub mod slug;
pub mod store;
pub mod tenant;
pub mod tree;
pub mod types;

pub use app::{router, AppState};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
