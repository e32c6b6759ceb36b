use crate::core::influx::InfluxService;
use crate::core::tariff::{Tariff, TariffBook};
use crate::domain::model::{local_midnight, HourlyUsage, PriceBreakdown, PricePoint};
use crate::utils::error::{HabError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Hourly,
    Daily,
    Monthly,
}

impl Frequency {
    /// Local start of the bucket containing `time`.
    pub fn bucket(&self, time: DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Frequency::Hourly => time
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(time),
            Frequency::Daily => local_midnight(time.date_naive()),
            Frequency::Monthly => {
                let date = time.date_naive();
                local_midnight(date.with_day(1).unwrap_or(date))
            }
        }
    }
}

pub fn hours_in_year(year: i32) -> f64 {
    let leap = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
    if leap {
        366.0 * 24.0
    } else {
        365.0 * 24.0
    }
}

pub fn hours_in_month(year: i32, month: u32) -> f64 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };

    match (first, next) {
        (Some(first), Some(next)) => ((next - first).num_days() * 24) as f64,
        _ => 30.0 * 24.0,
    }
}

/// Cost of one hour of grid exchange.
///
/// Yearly amounts are spread evenly over the hours of the year, the monthly
/// fixed fee over the hours of the month. `belpex` is the monthly average in
/// c€/kWh and `invoice_peak` the billed peak of the month in kW.
pub fn hourly_breakdown(tariff: &Tariff, usage: &HourlyUsage, belpex: f64, invoice_peak: f64) -> PriceBreakdown {
    let year = usage.start.year();
    let year_hours = hours_in_year(year);
    let month_hours = hours_in_month(year, usage.start.month());

    let fixed = tariff.subscription_per_year / year_hours
        + tariff.energy_fund_per_year / year_hours
        + tariff.distribution_fixed_per_month / month_hours;

    let peak = tariff.distribution_per_kw_peak * invoice_peak / year_hours;

    let distribution =
        tariff.distribution_per_kwh * (usage.consumption_rate1 + usage.consumption_rate2);

    let consumption = tariff.consumption_rate1.price_per_kwh(belpex) * usage.consumption_rate1
        + tariff.consumption_rate2.price_per_kwh(belpex) * usage.consumption_rate2;

    let injection = tariff.injection_rate1.price_per_kwh(belpex) * usage.injection_rate1
        + tariff.injection_rate2.price_per_kwh(belpex) * usage.injection_rate2;

    PriceBreakdown {
        fixed,
        peak,
        distribution,
        consumption,
        injection: -injection,
        total: fixed + peak + distribution + consumption - injection,
    }
}

/// Splits `[start, end)` at every 1 January strictly inside it.
pub fn year_segments(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    if start >= end {
        return Vec::new();
    }

    let mut bounds = vec![start];
    for year in (start.year() + 1)..=end.year() {
        if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
            if new_year > start && new_year < end {
                bounds.push(new_year);
            }
        }
    }
    bounds.push(end);

    bounds.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Sums hourly breakdowns per bucket, ordered by bucket start.
pub fn aggregate<I>(rows: I, frequency: Frequency) -> Vec<PricePoint>
where
    I: IntoIterator<Item = (DateTime<Tz>, PriceBreakdown)>,
{
    let mut buckets: BTreeMap<DateTime<Tz>, PriceBreakdown> = BTreeMap::new();
    for (time, price) in rows {
        buckets
            .entry(frequency.bucket(time))
            .or_default()
            .add(&price);
    }

    buckets
        .into_iter()
        .map(|(start, price)| PricePoint { start, price })
        .collect()
}

pub struct PriceService {
    influx: Arc<InfluxService>,
    tariffs: TariffBook,
}

impl PriceService {
    pub fn new(influx: Arc<InfluxService>, tariffs: TariffBook) -> Self {
        Self { influx, tariffs }
    }

    pub fn tariffs(&self) -> &TariffBook {
        &self.tariffs
    }

    pub async fn aggregated_price(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        frequency: Frequency,
    ) -> Result<Vec<PricePoint>> {
        let mut rows = Vec::new();

        for (segment_start, segment_end) in year_segments(start, end) {
            let tariff = self.tariffs.get(segment_start.year())?;
            let usage = self.influx.hourly_usage(segment_start, segment_end).await?;
            tracing::debug!(
                start = %segment_start,
                end = %segment_end,
                hours = usage.len(),
                "pricing segment"
            );

            let mut monthly_inputs: BTreeMap<(i32, u32), (f64, f64)> = BTreeMap::new();
            for hour in &usage {
                let month = (hour.start.year(), hour.start.month());
                let (belpex, peak) = match monthly_inputs.get(&month) {
                    Some(inputs) => *inputs,
                    None => {
                        let inputs = self.monthly_inputs(month.0, month.1).await?;
                        monthly_inputs.insert(month, inputs);
                        inputs
                    }
                };

                rows.push((hour.start, hourly_breakdown(tariff, hour, belpex, peak)));
            }
        }

        Ok(aggregate(rows, frequency))
    }

    pub async fn monthly_price(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        self.aggregated_price(start, end, Frequency::Monthly).await
    }

    pub async fn daily_price(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        self.aggregated_price(start, end, Frequency::Daily).await
    }

    pub async fn hourly_price(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PricePoint>> {
        self.aggregated_price(start, end, Frequency::Hourly).await
    }

    async fn monthly_inputs(&self, year: i32, month: u32) -> Result<(f64, f64)> {
        let belpex = self
            .influx
            .monthly_belpex(year, month)
            .await?
            .ok_or_else(|| HabError::no_data(format!("belpex average for {:04}-{:02}", year, month)))?;
        let peak = self.influx.invoice_peak(year, month).await?;
        Ok((belpex, peak))
    }
}
