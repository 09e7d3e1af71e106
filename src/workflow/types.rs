use dashmap::DashSet;
use std::sync::LazyLock;

use crate::models::asset::{AssetId, AssetState};

/// How the step after a transition is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hand the next step to the queue when the kind defers.
    Deferred,
    /// Run every following step before returning.
    Inline,
    /// Like `Inline`, without generating versions.
    InlineWithoutDerivatives,
}

impl Mode {
    pub fn runs_inline(&self, defers: bool) -> bool {
        match self {
            Mode::Deferred => !defers,
            Mode::Inline | Mode::InlineWithoutDerivatives => true,
        }
    }

    pub fn generates(&self) -> bool {
        !matches!(self, Mode::InlineWithoutDerivatives)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: AssetState, to: AssetState },
    /// Precondition did not hold; nothing was touched.
    Skipped { state: AssetState },
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

// ────────────────────────────────────────────────────────────────
// ProcessingGuard - keeps two loops in this process off the same asset
// ────────────────────────────────────────────────────────────────

static IN_PROGRESS: LazyLock<DashSet<AssetId>> = LazyLock::new(DashSet::new);

pub struct ProcessingGuard(AssetId);

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        IN_PROGRESS.remove(&self.0);
    }
}

pub fn try_acquire(id: AssetId) -> Option<ProcessingGuard> {
    if IN_PROGRESS.insert(id) {
        Some(ProcessingGuard(id))
    } else {
        None
    }
}
