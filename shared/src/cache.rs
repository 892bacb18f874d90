//! Short-lived report cache backing share-card generation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::report::DetectionReport;

struct CachedReport {
    report: Arc<DetectionReport>,
    stored_at: Instant,
}

/// Bounded, expiring store of recent reports keyed by report id.
pub struct ReportCache {
    entries: Mutex<LruCache<Uuid, CachedReport>>,
    ttl: Duration,
}

impl ReportCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub async fn insert(&self, report: DetectionReport) -> Arc<DetectionReport> {
        let report = Arc::new(report);
        self.entries.lock().await.put(
            report.report_id(),
            CachedReport {
                report: Arc::clone(&report),
                stored_at: Instant::now(),
            },
        );
        report
    }

    /// The report, unless it was never stored, was evicted, or has expired.
    pub async fn get(&self, report_id: &Uuid) -> Option<Arc<DetectionReport>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(report_id) {
            Some(cached) => cached.stored_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            entries.pop(report_id);
            return None;
        }
        entries.get(report_id).map(|cached| Arc::clone(&cached.report))
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
