use crate::core::JobStage;

/// Remembers the last announced job stage so each distinct stage is
/// surfaced exactly once, however often the poll loop sees it.
#[derive(Debug, Default)]
pub(super) struct StageTracker {
    last: Option<JobStage>,
}

impl StageTracker {
    /// Returns the stage if this snapshot moved to a different one.
    ///
    /// A snapshot without a stage is not a change; servers omit the field
    /// between phases and that must not cause re-announcements.
    pub fn observe(&mut self, stage: Option<JobStage>) -> Option<JobStage> {
        match stage {
            Some(stage) if self.last != Some(stage) => {
                self.last = Some(stage);
                Some(stage)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announces_each_distinct_stage_once() {
        let mut tracker = StageTracker::default();
        assert_eq!(tracker.observe(Some(JobStage::Uploading)), Some(JobStage::Uploading));
        assert_eq!(tracker.observe(Some(JobStage::Uploading)), None);
        assert_eq!(tracker.observe(Some(JobStage::Extracting)), Some(JobStage::Extracting));
        assert_eq!(tracker.observe(Some(JobStage::Extracting)), None);
        assert_eq!(tracker.observe(Some(JobStage::Classifying)), Some(JobStage::Classifying));
    }

    #[test]
    fn missing_stage_does_not_reset_tracking() {
        let mut tracker = StageTracker::default();
        assert_eq!(tracker.observe(Some(JobStage::Processing)), Some(JobStage::Processing));
        assert_eq!(tracker.observe(None), None);
        assert_eq!(tracker.observe(Some(JobStage::Processing)), None);
    }
}
