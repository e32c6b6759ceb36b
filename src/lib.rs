pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::api::{router, AppState};
pub use crate::config::{AppConfig, CliArgs};
pub use crate::core::{BelpexService, InfluxService, PriceService, TtlCache};
pub use crate::utils::error::{HabError, Result};
