//! Shared pipeline state: run statistics and the latest schedule
//! snapshot.
//!
//! The snapshot is swapped atomically after each optimizer run so API
//! reads never take a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

use crate::optimizer::AssignmentOutcome;
use crate::types::OptimizationImprovements;

/// Result of the most recent optimization cycle, published for the API.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSnapshot {
    pub run_id: uuid::Uuid,
    pub generated_at: i64,
    pub assignments: Vec<AssignmentOutcome>,
    pub improvements: OptimizationImprovements,
    pub feasible: bool,
}

/// Monotonic counters for the health/status surface.
#[derive(Default)]
pub struct PipelineStats {
    pub submissions: AtomicU64,
    pub predictions: AtomicU64,
    pub cycles: AtomicU64,
    pub conflicts_detected: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub stage_failures: AtomicU64,
}

/// Serializable view of [`PipelineStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub submissions: u64,
    pub predictions: u64,
    pub cycles: u64,
    pub conflicts_detected: u64,
    pub alerts_sent: u64,
    pub stage_failures: u64,
}

impl PipelineStats {
    pub fn view(&self) -> StatsView {
        StatsView {
            submissions: self.submissions.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            conflicts_detected: self.conflicts_detected.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            stage_failures: self.stage_failures.load(Ordering::Relaxed),
        }
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// Lock-free holder for the latest snapshot.
#[derive(Default)]
pub struct ScheduleBoard {
    latest: ArcSwapOption<ScheduleSnapshot>,
}

impl ScheduleBoard {
    pub fn publish(&self, snapshot: ScheduleSnapshot) {
        self.latest.store(Some(Arc::new(snapshot)));
    }

    pub fn latest(&self) -> Option<Arc<ScheduleSnapshot>> {
        self.latest.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_publish_and_read() {
        let board = ScheduleBoard::default();
        assert!(board.latest().is_none());
        board.publish(ScheduleSnapshot {
            run_id: uuid::Uuid::new_v4(),
            generated_at: 1,
            assignments: Vec::new(),
            improvements: OptimizationImprovements::default(),
            feasible: true,
        });
        let snapshot = board.latest().expect("published");
        assert_eq!(snapshot.generated_at, 1);

        // A second publish replaces the first
        board.publish(ScheduleSnapshot {
            run_id: uuid::Uuid::new_v4(),
            generated_at: 2,
            assignments: Vec::new(),
            improvements: OptimizationImprovements::default(),
            feasible: true,
        });
        assert_eq!(board.latest().expect("published").generated_at, 2);
    }

    #[test]
    fn stats_counters_accumulate() {
        let stats = PipelineStats::default();
        PipelineStats::bump(&stats.submissions);
        PipelineStats::bump(&stats.submissions);
        PipelineStats::add(&stats.conflicts_detected, 3);
        let view = stats.view();
        assert_eq!(view.submissions, 2);
        assert_eq!(view.conflicts_detected, 3);
        assert_eq!(view.cycles, 0);
    }
}
