//! Experiment lifecycle status

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an experiment.
///
/// ```text
/// Uninitialized ──fulfil──> Ready ──run──> Running ──> Done
///       │                                    │ ├────> Failed
///       ├──> Failed / Interrupted            │ ├────> Interrupted { timed_out }
///       │                                    │ └────> Cancelled
/// ```
///
/// Terminal statuses (`Done`, `Failed`, `Interrupted`, `Cancelled`) only
/// change again through an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Prerequisites declared but not yet fulfilled
    Uninitialized,
    /// Eligible to run
    Ready,
    /// Currently executing (prerequisites or body)
    Running,
    /// Body returned normally
    Done,
    /// Prerequisites or body reported a domain failure
    Failed,
    /// Stopped by an interruption; `timed_out` tells a deadline apart from
    /// any other interruption
    Interrupted {
        /// Whether the timeout supervisor caused the interruption
        timed_out: bool,
    },
    /// Stopped by a scheduler-initiated hard stop
    Cancelled,
}

impl Status {
    /// Whether no further transition happens without a reset.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Failed | Self::Interrupted { .. } | Self::Cancelled
        )
    }

    /// Whether the experiment has not been started yet.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Ready)
    }

    /// Whether this is an interruption caused by a deadline.
    #[must_use]
    pub const fn timed_out(self) -> bool {
        matches!(self, Self::Interrupted { timed_out: true })
    }

    /// Rank used to aggregate the statuses of several experiments: the lower
    /// the rank, the "worse" the status.
    const fn rank(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Interrupted { .. } => 1,
            Self::Cancelled => 2,
            Self::Running => 3,
            Self::Uninitialized => 4,
            Self::Ready => 5,
            Self::Done => 6,
        }
    }

    /// Lowest status of a collection: any failure dominates, then running,
    /// then not-started, and `Done` only when everything is done.
    ///
    /// An empty collection is `Done`.
    pub fn lowest<I: IntoIterator<Item = Self>>(statuses: I) -> Self {
        statuses
            .into_iter()
            .min_by_key(|s| s.rank())
            .unwrap_or(Self::Done)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Ready => f.write_str("ready"),
            Self::Running => f.write_str("running"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
            Self::Interrupted { timed_out: true } => f.write_str("timed out"),
            Self::Interrupted { timed_out: false } => f.write_str("interrupted"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!Status::Uninitialized.is_terminal());
        assert!(!Status::Ready.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(Status::Done.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Interrupted { timed_out: false }.is_terminal());
        assert!(Status::Interrupted { timed_out: true }.is_terminal());
        assert!(Status::Cancelled.is_terminal());
    }

    #[test]
    fn test_timed_out_only_for_deadline() {
        assert!(Status::Interrupted { timed_out: true }.timed_out());
        assert!(!Status::Interrupted { timed_out: false }.timed_out());
        assert!(!Status::Cancelled.timed_out());
    }

    #[test]
    fn test_lowest_status() {
        assert_eq!(Status::lowest([Status::Done, Status::Done]), Status::Done);
        assert_eq!(Status::lowest([Status::Done, Status::Ready]), Status::Ready);
        assert_eq!(
            Status::lowest([Status::Ready, Status::Uninitialized, Status::Done]),
            Status::Uninitialized
        );
        assert_eq!(
            Status::lowest([Status::Running, Status::Uninitialized]),
            Status::Running
        );
        assert_eq!(
            Status::lowest([Status::Running, Status::Failed, Status::Done]),
            Status::Failed
        );
        assert_eq!(Status::lowest([]), Status::Done);
    }

    #[test]
    fn test_status_serialization() {
        let status = Status::Interrupted { timed_out: true };
        let json = serde_json::to_string(&status).unwrap();
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(status, back);
    }
}
