//! Requeue requests.
//!
//! Stages ask for one of three intervals; when several stages ask, the
//! shortest interval wins.

use crate::config::RequeueIntervals;
use kube_runtime::controller::Action;

/// Variants are ordered shortest first so `min` picks the most urgent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Requeue {
    Short,
    Medium,
    Long,
    /// Wait for the next watch event
    Never,
}

impl Requeue {
    pub fn shortest(self, other: Self) -> Self {
        self.min(other)
    }

    pub fn to_action(self, intervals: &RequeueIntervals) -> Action {
        match self {
            Self::Short => Action::requeue(intervals.short),
            Self::Medium => Action::requeue(intervals.medium),
            Self::Long => Action::requeue(intervals.long),
            Self::Never => Action::await_change(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortest_wins() {
        assert_eq!(Requeue::Long.shortest(Requeue::Medium), Requeue::Medium);
        assert_eq!(Requeue::Never.shortest(Requeue::Long), Requeue::Long);
        assert_eq!(Requeue::Short.shortest(Requeue::Never), Requeue::Short);
        assert_eq!(Requeue::Never.shortest(Requeue::Never), Requeue::Never);
    }

    #[test]
    fn test_actions_use_configured_intervals() {
        let intervals = RequeueIntervals::default();
        assert_eq!(Requeue::Medium.to_action(&intervals), Action::requeue(intervals.medium));
        assert_eq!(Requeue::Never.to_action(&intervals), Action::await_change());
    }
}
