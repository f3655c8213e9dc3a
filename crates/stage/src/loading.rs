use crate::pipeline::LoadStage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// When the loading indicator clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingPolicy {
    /// As soon as the model stage settles, successfully or not.
    AfterModel,
    /// Once every stage has settled, including failures and skips.
    #[default]
    AfterAllAssets,
}

/// Pending/complete flag behind the loading overlay.
#[derive(Debug, Clone)]
pub struct LoadingTracker {
    policy: LoadingPolicy,
    settled: BTreeSet<LoadStage>,
    finished: bool,
}

impl LoadingTracker {
    pub fn new(policy: LoadingPolicy) -> Self {
        Self {
            policy,
            settled: BTreeSet::new(),
            finished: false,
        }
    }

    pub fn policy(&self) -> LoadingPolicy {
        self.policy
    }

    /// Record that `stage` loaded, failed or was skipped.
    pub fn settle(&mut self, stage: LoadStage) {
        if self.settled.insert(stage) {
            tracing::debug!(?stage, pending = self.is_pending(), "load stage settled");
        }
    }

    /// The pipeline ran to completion.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_settled(&self, stage: LoadStage) -> bool {
        self.settled.contains(&stage)
    }

    pub fn is_pending(&self) -> bool {
        if self.finished {
            return false;
        }
        match self.policy {
            LoadingPolicy::AfterModel => !self.is_settled(LoadStage::Model),
            LoadingPolicy::AfterAllAssets => !LoadStage::ALL.iter().all(|s| self.is_settled(*s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_model_clears_on_model_failure_too() {
        let mut t = LoadingTracker::new(LoadingPolicy::AfterModel);
        assert!(t.is_pending());
        t.settle(LoadStage::Environment);
        assert!(t.is_pending());
        t.settle(LoadStage::Model);
        assert!(!t.is_pending());
    }

    #[test]
    fn after_all_assets_waits_for_every_stage() {
        let mut t = LoadingTracker::new(LoadingPolicy::AfterAllAssets);
        t.settle(LoadStage::Model);
        t.settle(LoadStage::Text);
        assert!(t.is_pending());
        t.settle(LoadStage::Environment);
        assert!(!t.is_pending());
    }

    #[test]
    fn finish_clears_any_policy() {
        let mut t = LoadingTracker::new(LoadingPolicy::AfterAllAssets);
        t.finish();
        assert!(!t.is_pending());
    }
}
