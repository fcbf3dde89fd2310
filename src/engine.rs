use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::{self, Cache};
use crate::db;
use crate::error::{AttendanceError, Result};
use crate::models::{
    AttendanceRecord, AttendanceStatus, BulkEntry, DailyStatistics, MonthlyReportEntry,
    RangeStatistics,
};
use crate::report;

const MONTHLY_REPORT_TTL: Duration = Duration::from_secs(3600);
const DAILY_STATS_TTL: Duration = Duration::from_secs(300);

/// Records attendance and serves the cached report read paths.
///
/// Owns cache key construction and invalidation; the cache itself is an
/// injected collaborator and its failures never fail a request.
pub struct AttendanceReportEngine {
    pool: PgPool,
    cache: Arc<dyn Cache>,
}

impl AttendanceReportEngine {
    pub fn new(pool: PgPool, cache: Arc<dyn Cache>) -> Self {
        Self { pool, cache }
    }

    /// Records one day of attendance for a batch of students.
    ///
    /// All-or-nothing: an unknown student or rejected write anywhere in the
    /// batch rolls back every entry. `date` defaults to today.
    pub async fn record_bulk(
        &self,
        date: Option<NaiveDate>,
        entries: &[BulkEntry],
        recorded_by: Uuid,
    ) -> Result<Vec<AttendanceRecord>> {
        if entries.is_empty() {
            return Err(AttendanceError::Validation(
                "attendance batch must not be empty".to_string(),
            ));
        }

        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let records = db::record_bulk(&self.pool, date, entries, recorded_by).await?;

        for record in &records {
            tracing::info!(
                student_id = %record.student_id,
                date = %record.date,
                status = %record.status,
                recorded_by = %record.recorded_by,
                "attendance recorded"
            );
        }
        self.invalidate_for_date(date).await;

        Ok(records)
    }

    /// Per-student aggregates for one calendar month, optionally narrowed to
    /// a class. Cached for an hour per (month, class) variant.
    pub async fn monthly_report(
        &self,
        month: &str,
        class: Option<&str>,
    ) -> Result<Vec<MonthlyReportEntry>> {
        let (start, end) = report::month_bounds(month)?;
        let key = cache::monthly_report_key(month, class);
        if let Some(entries) = self.cache_get::<Vec<MonthlyReportEntry>>(&key).await {
            return Ok(entries);
        }

        let total_days = report::days_in_range(start, end);
        let students = db::fetch_students_with_attendance(&self.pool, start, end, class).await?;
        let entries = report::build_monthly_report(&students, total_days);

        self.cache_put(&key, &entries, MONTHLY_REPORT_TTL).await;
        Ok(entries)
    }

    /// Fleet-wide statistics for the current date.
    pub async fn today_statistics(&self) -> Result<DailyStatistics> {
        self.statistics_for(Utc::now().date_naive()).await
    }

    /// Fleet-wide statistics for one date. Cached for five minutes.
    pub async fn statistics_for(&self, date: NaiveDate) -> Result<DailyStatistics> {
        let key = cache::daily_stats_key(date);
        if let Some(stats) = self.cache_get::<DailyStatistics>(&key).await {
            return Ok(stats);
        }

        let total_students = db::count_students(&self.pool).await?;
        let present = db::count_by_status(&self.pool, date, AttendanceStatus::Present).await?;
        let absent = db::count_by_status(&self.pool, date, AttendanceStatus::Absent).await?;
        let late = db::count_by_status(&self.pool, date, AttendanceStatus::Late).await?;
        let recorded = db::count_recorded(&self.pool, date).await?;
        let stats =
            report::build_daily_statistics(date, total_students, present, absent, late, recorded);

        self.cache_put(&key, &stats, DAILY_STATS_TTL).await;
        Ok(stats)
    }

    /// Status totals over an inclusive date range. Not cached.
    pub async fn statistics_for_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RangeStatistics> {
        if start > end {
            return Err(AttendanceError::Validation(format!(
                "range start {start} is after end {end}"
            )));
        }
        db::count_statuses_in_range(&self.pool, start, end).await
    }

    async fn invalidate_for_date(&self, date: NaiveDate) {
        let classes = match db::list_classes(&self.pool).await {
            Ok(classes) => classes,
            Err(err) => {
                tracing::warn!(error = %err, "could not enumerate classes for cache invalidation");
                Vec::new()
            }
        };

        for key in invalidation_keys(date, &classes) {
            if let Err(err) = self.cache.forget(&key).await {
                tracing::warn!(key = %key, error = %err, "cache invalidation failed");
            }
        }
    }

    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cache read failed, recomputing");
                None
            }
        }
    }

    async fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "could not serialize cache entry");
                return;
            }
        };
        if let Err(err) = self.cache.put(key, &bytes, ttl).await {
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
    }
}

/// Keys cleared after a committed write for `date`: that day's statistics
/// plus the month's report variants, unfiltered and one per known class.
pub fn invalidation_keys(date: NaiveDate, classes: &[String]) -> Vec<String> {
    let month = date.format("%Y-%m").to_string();
    let mut keys = vec![
        cache::daily_stats_key(date),
        cache::monthly_report_key(&month, None),
    ];
    keys.extend(
        classes
            .iter()
            .map(|class| cache::monthly_report_key(&month, Some(class))),
    );
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidation_covers_day_month_and_class_variants() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let classes = vec!["10".to_string(), "9".to_string()];

        let keys = invalidation_keys(date, &classes);
        assert_eq!(
            keys,
            vec![
                "attendance:stats:2024-01-15".to_string(),
                "attendance:report:2024-01:all".to_string(),
                "attendance:report:2024-01:10".to_string(),
                "attendance:report:2024-01:9".to_string(),
            ]
        );
    }

    #[test]
    fn invalidation_without_classes_clears_shared_keys() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let keys = invalidation_keys(date, &[]);
        assert_eq!(
            keys,
            vec![
                "attendance:stats:2024-03-01".to_string(),
                "attendance:report:2024-03:all".to_string(),
            ]
        );
    }
}
