use crate::domain::model::{local_now, LOCAL_TZ};
use crate::utils::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
use chrono_tz::Tz;
use std::future::Future;
use std::ops::RangeInclusive;
use tokio::task::JoinHandle;

/// Fires at `minute` past every hour in `hours`, in local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    hours: RangeInclusive<u32>,
    minute: u32,
}

impl DailySchedule {
    pub fn new(hours: RangeInclusive<u32>, minute: u32) -> Self {
        let start = (*hours.start()).min(23);
        let end = (*hours.end()).min(23);
        Self {
            hours: start..=end,
            minute: minute.min(59),
        }
    }

    pub fn at(hour: u32, minute: u32) -> Self {
        Self::new(hour..=hour, minute)
    }

    /// First firing time strictly after `after`. Local times that do not
    /// exist (spring forward) are skipped; ambiguous ones fire once, at the
    /// earliest instant.
    pub fn next_after(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        let start_date = after.date_naive();

        for day in 0..3 {
            let date = start_date + ChronoDuration::days(day);
            for hour in self.hours.clone() {
                let Some(naive) = date.and_hms_opt(hour, self.minute, 0) else {
                    continue;
                };
                if let Some(candidate) = LOCAL_TZ.from_local_datetime(&naive).earliest() {
                    if candidate > after {
                        return Some(candidate);
                    }
                }
            }
        }

        None
    }
}

/// Runs jobs on their schedules until shut down.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job<F, Fut>(&mut self, name: &'static str, schedule: DailySchedule, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        tracing::info!(job = name, ?schedule, "scheduling job");

        let handle = tokio::spawn(async move {
            loop {
                let now = local_now();
                let Some(next) = schedule.next_after(now) else {
                    tracing::error!(job = name, "schedule never fires, stopping job");
                    return;
                };

                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!(job = name, next = %next, "waiting for next run");
                tokio::time::sleep(wait).await;

                tracing::info!(job = name, "job started");
                match job().await {
                    Ok(()) => tracing::info!(job = name, "job finished"),
                    Err(e) => tracing::error!(job = name, error = %e, "job failed"),
                }
            }
        });

        self.jobs.push((name, handle));
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn shutdown(self) {
        for (name, handle) in self.jobs {
            handle.abort();
            tracing::debug!(job = name, "job stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        LOCAL_TZ.with_ymd_and_hms(y, m, d, h, min, 0).earliest().unwrap()
    }

    #[test]
    fn test_next_run_same_day_and_next_day() {
        let schedule = DailySchedule::at(15, 0);

        assert_eq!(
            schedule.next_after(local(2024, 5, 1, 9, 30)),
            Some(local(2024, 5, 1, 15, 0))
        );
        assert_eq!(
            schedule.next_after(local(2024, 5, 1, 15, 0)),
            Some(local(2024, 5, 2, 15, 0))
        );
    }

    #[test]
    fn test_hour_range() {
        let schedule = DailySchedule::new(12..=23, 47);

        assert_eq!(
            schedule.next_after(local(2024, 5, 1, 3, 0)),
            Some(local(2024, 5, 1, 12, 47))
        );
        assert_eq!(
            schedule.next_after(local(2024, 5, 1, 12, 47)),
            Some(local(2024, 5, 1, 13, 47))
        );
        assert_eq!(
            schedule.next_after(local(2024, 5, 1, 23, 50)),
            Some(local(2024, 5, 2, 12, 47))
        );
    }

    #[test]
    fn test_skips_nonexistent_local_time() {
        // 2024-03-31 02:00-03:00 does not exist in Brussels
        let schedule = DailySchedule::at(2, 30);
        assert_eq!(
            schedule.next_after(local(2024, 3, 30, 12, 0)),
            Some(local(2024, 4, 1, 2, 30))
        );
    }

    #[tokio::test]
    async fn test_shutdown_aborts_jobs() {
        let mut scheduler = Scheduler::new();
        scheduler.add_job("noop", DailySchedule::at(3, 0), || async { Ok(()) });
        assert_eq!(scheduler.job_count(), 1);
        scheduler.shutdown();
    }
}
