//! Removes stored blobs that no event or ticket references any more.
//!
//! Compensating deletes are best-effort, so a crash or a failed delete can
//! leave blobs behind. This sweep reclaims them. Recent blobs are skipped
//! because an upload may still be waiting for the write that references it.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::EventRepository;
use crate::storage::{key_from_url, ObjectStorage};
use crate::utils::AppError;

pub const DEFAULT_MIN_AGE_SECS: i64 = 86_400;

#[derive(Debug, Clone, Deserialize)]
pub struct SweepOptions {
    #[serde(default = "default_min_age")]
    pub min_age_secs: i64,
}

fn default_min_age() -> i64 {
    DEFAULT_MIN_AGE_SECS
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            min_age_secs: DEFAULT_MIN_AGE_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub referenced: usize,
    pub too_recent: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub async fn sweep_orphans(
    events: &dyn EventRepository,
    storage: &dyn ObjectStorage,
    options: &SweepOptions,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    if options.min_age_secs < 0 {
        return Err(AppError::ValidationError(
            "min_age_secs cannot be negative".to_string(),
        ));
    }
    let cutoff = Duration::try_seconds(options.min_age_secs)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| AppError::ValidationError("min_age_secs is out of range".to_string()))?;

    let urls = events.referenced_blob_urls().await?;
    let referenced: HashSet<&str> = urls.iter().filter_map(|url| key_from_url(url)).collect();

    let mut report = SweepReport::default();
    for blob in storage.list().await? {
        report.scanned += 1;
        if referenced.contains(blob.key.as_str()) {
            report.referenced += 1;
            continue;
        }
        if blob.modified > cutoff {
            report.too_recent += 1;
            continue;
        }
        match storage.delete(&blob.key).await {
            Ok(()) => report.deleted += 1,
            Err(e) => {
                tracing::warn!(key = %blob.key, error = %e, "failed to delete orphaned blob");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        deleted = report.deleted,
        failed = report.failed,
        "orphan sweep finished"
    );
    Ok(report)
}
