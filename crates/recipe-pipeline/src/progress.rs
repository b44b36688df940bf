//! Shared cell updated by a pipeline executor as it moves between stages,
//! read by the connection-level progress emitter that runs concurrently
//! with the pipeline (§4.4, §9 "Design Notes"). This is the only piece of
//! intra-request concurrency the core exposes — everything else about a
//! request runs sequentially on the session's own task.

use std::sync::Mutex;
use std::time::Instant;

use recipe_core::StageName;

pub struct StageTracker {
    current: Mutex<Option<StageName>>,
    start: Instant,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            start: Instant::now(),
        }
    }

    /// Called by an executor immediately before it starts a named stage.
    pub fn enter(&self, stage: StageName) {
        *self.current.lock().unwrap() = Some(stage);
    }

    /// Read by the progress emitter: the stage in flight (if any) and total
    /// elapsed seconds since the tracker was created.
    pub fn snapshot(&self) -> (Option<StageName>, f64) {
        (*self.current.lock().unwrap(), self.start.elapsed().as_secs_f64())
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_no_stage_entered() {
        let tracker = StageTracker::new();
        let (stage, _elapsed) = tracker.snapshot();
        assert!(stage.is_none());
    }

    #[test]
    fn enter_updates_the_snapshot() {
        let tracker = StageTracker::new();
        tracker.enter(StageName::Rewrite);
        let (stage, _elapsed) = tracker.snapshot();
        assert_eq!(stage, Some(StageName::Rewrite));
        tracker.enter(StageName::Retrieve);
        assert_eq!(tracker.snapshot().0, Some(StageName::Retrieve));
    }
}
