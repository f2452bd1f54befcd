//! Per-element viewability state machine.
//!
//! ```text
//!                visible                   timer fired, elapsed >= required
//!   Idle ----------------> Pending ------------------------------> Confirmed
//!    ^                        |                                       |
//!    |        hidden          |  hidden (timer cancelled)             |
//!    +------------------------+---------------------------------------+
//!    |                                                                |
//!    |        hidden                refresh / reset                   |
//!    +----------------- Unconfirmed <---------------------------------+
//! ```
//!
//! A confirmation timer exists only inside `PendingConfirmation`, and a
//! wake-up is only honoured when it matches the id stored there. Leaving the
//! phase cancels the timer, so a superseded timer can never report.

use adview_protocol::{Millis, TimerId};

use crate::host::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Below threshold, or never seen.
    #[default]
    Idle,
    /// Viewable, waiting for the required time to pass.
    PendingConfirmation { since: Millis, timer: TimerId },
    /// Viewable and reported for this streak.
    Confirmed { since: Millis },
    /// Viewable, but the report was consumed by a refresh or reset. Only a
    /// fresh streak reports again.
    Unconfirmed { since: Option<Millis> },
}

/// A callback the tracker owes its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub viewable: bool,
    pub duration: Millis,
}

impl Phase {
    pub fn is_viewable(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn view_start(&self) -> Option<Millis> {
        match *self {
            Self::Idle => None,
            Self::PendingConfirmation { since, .. } | Self::Confirmed { since } => Some(since),
            Self::Unconfirmed { since } => since,
        }
    }

    pub fn has_reported(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn pending_timer(&self) -> Option<TimerId> {
        match *self {
            Self::PendingConfirmation { timer, .. } => Some(timer),
            _ => None,
        }
    }

    /// Apply a visibility change. `viewable` is already resolved against the
    /// observation's threshold.
    pub fn on_visibility(
        self,
        viewable: bool,
        required: Millis,
        scheduler: &mut impl Scheduler,
    ) -> (Self, Option<Report>) {
        let now = scheduler.now();
        match (self, viewable) {
            (Self::Idle, true) => {
                let timer = scheduler.set_timeout(required);
                (Self::PendingConfirmation { since: now, timer }, None)
            }
            (phase, true) => (phase, None),
            (Self::Idle, false) => (Self::Idle, None),
            (phase, false) => {
                if let Some(timer) = phase.pending_timer() {
                    scheduler.clear_timer(timer);
                }
                let report = phase.view_start().map(|since| Report {
                    viewable: false,
                    duration: now.saturating_sub(since),
                });
                (Self::Idle, report)
            }
        }
    }

    /// Apply a fired timer. Timers that do not belong to this phase are
    /// ignored.
    pub fn on_timer(
        self,
        fired: TimerId,
        required: Millis,
        scheduler: &mut impl Scheduler,
    ) -> (Self, Option<Report>) {
        let Self::PendingConfirmation { since, timer } = self else {
            return (self, None);
        };
        if timer != fired {
            return (self, None);
        }

        let elapsed = scheduler.now().saturating_sub(since);
        if elapsed >= required {
            let report = Report {
                viewable: true,
                duration: elapsed,
            };
            (Self::Confirmed { since }, Some(report))
        } else {
            // Host fired early; wait out the remainder.
            let timer = scheduler.set_timeout(required - elapsed);
            (Self::PendingConfirmation { since, timer }, None)
        }
    }

    /// Clear the reported flag so the element can report again after a
    /// reload. A pending confirmation is unaffected.
    pub fn rearm(self) -> Self {
        match self {
            Self::Confirmed { since } => Self::Unconfirmed { since: Some(since) },
            other => other,
        }
    }

    /// Forget the current streak's start and report, keeping `isViewable`.
    pub fn reset(self, scheduler: &mut impl Scheduler) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::PendingConfirmation { timer, .. } => {
                scheduler.clear_timer(timer);
                Self::Unconfirmed { since: None }
            }
            Self::Confirmed { .. } | Self::Unconfirmed { .. } => Self::Unconfirmed { since: None },
        }
    }

    /// Cancel anything this phase has armed. Used on unobserve.
    pub fn cancel(self, scheduler: &mut impl Scheduler) {
        if let Some(timer) = self.pending_timer() {
            scheduler.clear_timer(timer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Wakeup;
    use crate::virtual_host::VirtualHost;

    const REQUIRED: Millis = 1_000;

    #[test]
    fn confirms_after_required_time() {
        let mut host = VirtualHost::new();
        let (phase, report) = Phase::Idle.on_visibility(true, REQUIRED, &mut host);
        assert!(report.is_none());
        let timer = phase.pending_timer().unwrap();

        assert_eq!(host.poll_until(5_000), Some(Wakeup::Timer(timer)));
        let (phase, report) = phase.on_timer(timer, REQUIRED, &mut host);
        assert_eq!(phase, Phase::Confirmed { since: 0 });
        assert_eq!(
            report,
            Some(Report {
                viewable: true,
                duration: 1_000
            })
        );
    }

    #[test]
    fn hiding_cancels_the_pending_timer() {
        let mut host = VirtualHost::new();
        let (phase, _) = Phase::Idle.on_visibility(true, REQUIRED, &mut host);
        let timer = phase.pending_timer().unwrap();
        assert_eq!(host.poll_until(300), None);

        let (phase, report) = phase.on_visibility(false, REQUIRED, &mut host);
        assert_eq!(phase, Phase::Idle);
        assert_eq!(
            report,
            Some(Report {
                viewable: false,
                duration: 300
            })
        );
        assert_eq!(host.pending_timers(), 0);

        // A stale wake-up for the cancelled timer is ignored.
        let (phase, report) = phase.on_timer(timer, REQUIRED, &mut host);
        assert_eq!(phase, Phase::Idle);
        assert!(report.is_none());
    }

    #[test]
    fn repeated_visible_signals_keep_one_timer() {
        let mut host = VirtualHost::new();
        let (phase, _) = Phase::Idle.on_visibility(true, REQUIRED, &mut host);
        let (phase, _) = phase.on_visibility(true, REQUIRED, &mut host);
        let (_, _) = phase.on_visibility(true, REQUIRED, &mut host);
        assert_eq!(host.pending_timers(), 1);
    }

    #[test]
    fn reset_streak_hides_silently() {
        let mut host = VirtualHost::new();
        let phase = Phase::Confirmed { since: 0 }.reset(&mut host);
        assert!(phase.is_viewable());
        assert_eq!(phase.view_start(), None);

        let (phase, report) = phase.on_visibility(false, REQUIRED, &mut host);
        assert_eq!(phase, Phase::Idle);
        assert!(report.is_none());
    }

    #[test]
    fn rearm_keeps_streak_start() {
        let phase = Phase::Confirmed { since: 40 }.rearm();
        assert_eq!(phase, Phase::Unconfirmed { since: Some(40) });
        assert!(!phase.has_reported());
    }
}
