//! Bulk ingestion worker.
//!
//! Fills the OHLCV store over a date range by fetching one exchange-wide
//! snapshot per trading day. One request per quantum, resumable via the
//! complete-day skip set, cancellable between requests. A single worker
//! instance may run per process; starting while running is a conflict.

use crate::datasource::ExchangeFeed;
use crate::db::Repository;
use crate::error::AppError;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc, Weekday};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Progress snapshot published by the worker. Mutated under a lock; readers
/// always see a consistent view.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkSyncState {
    pub is_running: bool,
    pub mode: String,
    pub total_days: usize,
    pub processed_days: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// Rows written across all successful days.
    pub processed_rows: usize,
    pub current_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub failed_dates: Vec<String>,
    pub estimated_time: String,
}

/// Summary of what the store already holds, driven by the complete-day
/// threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SyncInfo {
    pub first_synced_date: Option<NaiveDate>,
    pub last_synced_date: Option<NaiveDate>,
    pub synced_days_count: usize,
    pub gaps_count: usize,
}

pub struct BulkSyncWorker {
    repo: Arc<Repository>,
    feed: Arc<dyn ExchangeFeed>,
    quantum: Duration,
    complete_threshold: i64,
    retention_years: i64,
    state: RwLock<BulkSyncState>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl BulkSyncWorker {
    pub fn new(
        repo: Arc<Repository>,
        feed: Arc<dyn ExchangeFeed>,
        quantum: Duration,
        complete_threshold: i64,
        retention_years: i64,
    ) -> Self {
        Self {
            repo,
            feed,
            quantum,
            complete_threshold,
            retention_years,
            state: RwLock::new(BulkSyncState::default()),
            stop_tx: Mutex::new(None),
        }
    }

    /// Current progress snapshot.
    pub async fn status(&self) -> BulkSyncState {
        self.state.read().await.clone()
    }

    /// Summary of complete days and gaps in the store.
    pub async fn sync_info(&self) -> Result<SyncInfo, sqlx::Error> {
        let first = self.repo.first_synced_date(self.complete_threshold).await?;
        let last = self.repo.last_synced_date(self.complete_threshold).await?;

        let (synced_days_count, gaps_count) = match (first, last) {
            (Some(first), Some(last)) => {
                let synced = self
                    .repo
                    .synced_dates(first, last, self.complete_threshold)
                    .await?;
                let gaps = trading_days(first, last)
                    .into_iter()
                    .filter(|d| !synced.contains(d))
                    .count();
                (synced.len(), gaps)
            }
            _ => (0, 0),
        };

        Ok(SyncInfo {
            first_synced_date: first,
            last_synced_date: last,
            synced_days_count,
            gaps_count,
        })
    }

    /// Start a sync over `[start_date, end_date]`.
    ///
    /// Returns `Conflict` when a run is already in progress; any terminal
    /// state (completed, cancelled, failed) is restartable and resets.
    pub async fn start(
        self: Arc<Self>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        skip_synced: bool,
    ) -> Result<(), AppError> {
        if start_date > end_date {
            return Err(AppError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }

        {
            let mut state = self.state.write().await;
            if state.is_running {
                return Err(AppError::Conflict("sync is already running".to_string()));
            }
            *state = BulkSyncState {
                is_running: true,
                mode: "date".to_string(),
                started_at: Some(Utc::now()),
                ..BulkSyncState::default()
            };
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.stop_tx.lock().await = Some(stop_tx);

        tokio::spawn(async move {
            self.run(start_date, end_date, skip_synced, stop_rx).await;
        });

        Ok(())
    }

    /// Signal the running sync to stop. No new request is issued after the
    /// signal; an in-flight request completes.
    pub async fn stop(&self) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if !state.is_running {
            return Err(AppError::Validation("no sync is running".to_string()));
        }

        if let Some(tx) = self.stop_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        state.is_running = false;
        state.error_message = Some("stopped by user".to_string());
        state.completed_at = Some(Utc::now());
        info!("bulk sync stop requested");
        Ok(())
    }

    async fn run(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        skip_synced: bool,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let all_days = trading_days(start_date, end_date);

        let synced: HashSet<NaiveDate> = if skip_synced {
            match self
                .repo
                .synced_dates(start_date, end_date, self.complete_threshold)
                .await
            {
                Ok(synced) => synced,
                Err(e) => {
                    warn!(error = %e, "failed to load synced dates, syncing all days");
                    HashSet::new()
                }
            }
        } else {
            HashSet::new()
        };

        let days_to_sync: Vec<NaiveDate> = all_days
            .iter()
            .copied()
            .filter(|d| !synced.contains(d))
            .collect();
        let pre_skipped = all_days.len() - days_to_sync.len();

        {
            let mut state = self.state.write().await;
            state.total_days = days_to_sync.len();
            state.skipped_count = pre_skipped;
            state.estimated_time =
                format_duration(self.quantum * days_to_sync.len() as u32);
        }

        info!(
            total_days = days_to_sync.len(),
            skipped = pre_skipped,
            "bulk sync started"
        );

        let mut pacer = tokio::time::interval(self.quantum);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for (i, day) in days_to_sync.iter().enumerate() {
            if *stop_rx.borrow() {
                info!("bulk sync cancelled");
                return;
            }

            // One request per quantum, anchored to request starts. The
            // pacing sleep itself is cancellable.
            tokio::select! {
                _ = pacer.tick() => {}
                _ = stop_rx.changed() => {
                    info!("bulk sync cancelled during pacing");
                    return;
                }
            }

            {
                let mut state = self.state.write().await;
                state.current_date = day.to_string();
                state.processed_days = i;
                let remaining = days_to_sync.len() - i;
                state.estimated_time = format_duration(self.quantum * remaining as u32);
            }

            match self.feed.fetch_daily_snapshot(*day).await {
                Err(e) => {
                    warn!(date = %day, error = %e, "snapshot fetch failed");
                    let mut state = self.state.write().await;
                    state.failed_count += 1;
                    state.failed_dates.push(day.to_string());
                }
                Ok(bars) if bars.is_empty() => {
                    // Zero parseable rows means a holiday, not a failure.
                    let mut state = self.state.write().await;
                    state.skipped_count += 1;
                }
                Ok(bars) => match self.repo.upsert_bars(&bars).await {
                    Ok(saved) => {
                        let mut state = self.state.write().await;
                        state.success_count += 1;
                        state.processed_rows += saved;
                    }
                    Err(e) => {
                        error!(date = %day, error = %e, "failed to save snapshot");
                        let mut state = self.state.write().await;
                        state.failed_count += 1;
                        state.failed_dates.push(day.to_string());
                    }
                },
            }

            let mut state = self.state.write().await;
            state.processed_days = i + 1;
        }

        if let Err(e) = self.repo.refresh_aggregates().await {
            error!(error = %e, "failed to refresh aggregates after sync");
        }

        // Post-run maintenance: raw bars past the retention horizon go;
        // rollups stay.
        let cutoff = Utc::now().date_naive() - chrono::Months::new(12 * self.retention_years as u32);
        match self.repo.prune_bars_before(cutoff).await {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, %cutoff, "evicted raw bars past retention"),
            Err(e) => error!(error = %e, "retention sweep failed"),
        }

        let mut state = self.state.write().await;
        state.is_running = false;
        state.completed_at = Some(Utc::now());
        state.estimated_time = "completed".to_string();
        info!(
            success = state.success_count,
            failed = state.failed_count,
            skipped = state.skipped_count,
            "bulk sync completed"
        );
    }
}

/// Candidate trading days in a range: weekends pre-filtered, holidays
/// learned later from empty snapshots.
pub fn trading_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(current);
        }
        current += ChronoDuration::days(1);
    }
    days
}

fn format_duration(d: Duration) -> String {
    let total_minutes = d.as_secs() / 60;
    if total_minutes == 0 {
        return "< 1 min".to_string();
    }

    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{} {} {} {}", hours, plural(hours, "hour"), minutes, plural(minutes, "min"))
    } else {
        format!("{} {}", minutes, plural(minutes, "min"))
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        unit.to_string()
    } else {
        format!("{}s", unit)
    }
}
