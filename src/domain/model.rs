use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::{Europe::Brussels, Tz};
use serde::Serialize;

/// Local timezone of the installation; every timestamp leaving the service is
/// expressed in it.
pub const LOCAL_TZ: Tz = Brussels;

pub const GRID_PRICE_UNIT: &str = "c€/kWh";

pub fn to_local(time: DateTime<Utc>) -> DateTime<Tz> {
    time.with_timezone(&LOCAL_TZ)
}

pub fn local_now() -> DateTime<Tz> {
    to_local(Utc::now())
}

/// Local midnight at the start of `date`. Brussels has no DST switch at
/// midnight, so the earliest mapping is always the right one.
pub fn local_midnight(date: NaiveDate) -> DateTime<Tz> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    LOCAL_TZ
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| to_local(naive.and_utc()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeData {
    pub timestamp: DateTime<Tz>,
    pub value: f64,
    pub unit: String,
}

impl TimeData {
    pub fn new(timestamp: DateTime<Tz>, value: f64, unit: &str) -> Self {
        Self {
            timestamp,
            value,
            unit: unit.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimePeriodStats {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub unit: String,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub stddev: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatPumpStatus {
    pub operating_mode: String,
    pub heat_source: String,
    pub defrost_status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPumpSetpoint {
    pub dhw: Option<f64>,
    pub heating: Option<f64>,
}

/// Grid energy (kWh) exchanged during one local hour, per meter register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyUsage {
    pub start: DateTime<Tz>,
    pub consumption_rate1: f64,
    pub consumption_rate2: f64,
    pub injection_rate1: f64,
    pub injection_rate2: f64,
}

/// Cost split of a period, in euro. Injection is negative (revenue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub fixed: f64,
    pub peak: f64,
    pub distribution: f64,
    pub consumption: f64,
    pub injection: f64,
    pub total: f64,
}

impl PriceBreakdown {
    pub const COMPONENTS: [&'static str; 6] = [
        "fixed",
        "peak",
        "distribution",
        "consumption",
        "injection",
        "total",
    ];

    pub fn add(&mut self, other: &PriceBreakdown) {
        self.fixed += other.fixed;
        self.peak += other.peak;
        self.distribution += other.distribution;
        self.consumption += other.consumption;
        self.injection += other.injection;
        self.total += other.total;
    }

    pub fn component(&self, name: &str) -> Option<f64> {
        match name {
            "fixed" => Some(self.fixed),
            "peak" => Some(self.peak),
            "distribution" => Some(self.distribution),
            "consumption" => Some(self.consumption),
            "injection" => Some(self.injection),
            "total" => Some(self.total),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub start: DateTime<Tz>,
    pub price: PriceBreakdown,
}
