pub mod belpex;
pub mod cache;
pub mod influx;
pub mod price;
pub mod scheduler;
pub mod stats;
pub mod tariff;

pub use crate::utils::error::Result;
pub use belpex::BelpexService;
pub use cache::TtlCache;
pub use influx::InfluxService;
pub use price::{Frequency, PriceService};
pub use scheduler::{DailySchedule, Scheduler};
pub use tariff::{Tariff, TariffBook};
