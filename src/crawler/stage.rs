//! Stage kinds and the run's concurrency model
//!
//! Every middleware, item processor and extractor declares whether it ever
//! suspends. A cooperative run only accepts stages that never yield.

use crate::TrawlError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a caller-supplied stage yields to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Plain synchronous code; runs to completion without yielding
    Blocking,

    /// Awaits its own futures (timers, I/O) while running
    Suspending,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => write!(f, "blocking"),
            Self::Suspending => write!(f, "suspending"),
        }
    }
}

/// Scheduling contract a run is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConcurrencyModel {
    /// Workers are separate tasks; stages may suspend
    #[default]
    Async,

    /// Workers share one task and interleave only at engine suspension
    /// points; stages must not suspend
    Cooperative,
}

impl ConcurrencyModel {
    /// Returns true if stages of `kind` may run under this model
    pub fn accepts(&self, kind: StageKind) -> bool {
        match self {
            Self::Async => true,
            Self::Cooperative => kind == StageKind::Blocking,
        }
    }

    /// Fails with `IncompatibleStageKind` if the stage cannot run under this model
    pub fn check(&self, stage: &str, kind: StageKind) -> Result<(), TrawlError> {
        if self.accepts(kind) {
            Ok(())
        } else {
            Err(TrawlError::IncompatibleStageKind {
                stage: stage.to_string(),
                kind,
                model: *self,
            })
        }
    }
}

impl fmt::Display for ConcurrencyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async => write!(f, "async"),
            Self::Cooperative => write!(f, "cooperative"),
        }
    }
}
