//! Escalation rules for a single cycle
//!
//! Pure function of (cycle, whether its reminder still exists, now). The
//! scheduler applies the returned transition; nothing here does I/O.

use super::model::{Cycle, Step};
use chrono::{Duration, NaiveDateTime};

/// How long after its target time a reminder still counts as due
pub const DUE_WINDOW_SECONDS: i64 = 60;

/// Elapsed time since `t0` at which step 2 is sent
pub const STEP_TWO_AFTER_SECONDS: i64 = 600;

/// Elapsed time since `t0` at which step 3 is sent
pub const STEP_THREE_AFTER_SECONDS: i64 = 1200;

/// Elapsed time since `t0` after which a cycle is removed
pub const EXPIRE_AFTER_SECONDS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// The owning reminder no longer exists
    Orphaned,
    Acknowledged,
    /// Final step reached and the expiry window passed without acknowledgment
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do this tick
    Hold,
    /// Send the message for this step and record it
    Escalate(Step),
    /// Delete the cycle
    Expire(ExpiryReason),
}

/// Decide what a cycle should do on this tick
///
/// At most one step is taken per call. A cycle escalated to step 3 at or after
/// the expiry threshold should be evaluated again by the caller, which then
/// yields `Expire(TimedOut)` in the same tick.
pub fn evaluate(cycle: &Cycle, owner_present: bool, now: NaiveDateTime) -> Transition {
    if !owner_present {
        return Transition::Expire(ExpiryReason::Orphaned);
    }

    let elapsed = cycle.elapsed(now);

    if cycle.acknowledged {
        return if elapsed >= Duration::seconds(EXPIRE_AFTER_SECONDS) {
            Transition::Expire(ExpiryReason::Acknowledged)
        } else {
            Transition::Hold
        };
    }

    match cycle.step {
        Step::First if elapsed >= Duration::seconds(STEP_TWO_AFTER_SECONDS) => {
            Transition::Escalate(Step::Second)
        }
        Step::Second if elapsed >= Duration::seconds(STEP_THREE_AFTER_SECONDS) => {
            Transition::Escalate(Step::Third)
        }
        Step::Third if elapsed >= Duration::seconds(EXPIRE_AFTER_SECONDS) => {
            Transition::Expire(ExpiryReason::TimedOut)
        }
        _ => Transition::Hold,
    }
}

/// Whether `now` falls in the due window that starts at `target`
pub fn is_due(target: NaiveDateTime, now: NaiveDateTime) -> bool {
    now >= target && now - target <= Duration::seconds(DUE_WINDOW_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn after(seconds: i64) -> NaiveDateTime {
        t0() + Duration::seconds(seconds)
    }

    fn cycle_at(step: Step) -> Cycle {
        let mut c = Cycle::start("rid", "chat", t0());
        c.escalate(step);
        c
    }

    #[test]
    fn test_orphan_expires_first() {
        let c = cycle_at(Step::First);
        assert_eq!(
            evaluate(&c, false, after(5)),
            Transition::Expire(ExpiryReason::Orphaned)
        );
    }

    #[test]
    fn test_step_thresholds() {
        let c = cycle_at(Step::First);
        assert_eq!(evaluate(&c, true, after(599)), Transition::Hold);
        assert_eq!(evaluate(&c, true, after(600)), Transition::Escalate(Step::Second));

        let c = cycle_at(Step::Second);
        assert_eq!(evaluate(&c, true, after(1199)), Transition::Hold);
        assert_eq!(evaluate(&c, true, after(1200)), Transition::Escalate(Step::Third));

        let c = cycle_at(Step::Third);
        assert_eq!(evaluate(&c, true, after(1799)), Transition::Hold);
        assert_eq!(
            evaluate(&c, true, after(1800)),
            Transition::Expire(ExpiryReason::TimedOut)
        );
    }

    #[test]
    fn test_one_step_per_evaluation_after_long_gap() {
        let c = cycle_at(Step::First);
        assert_eq!(evaluate(&c, true, after(1500)), Transition::Escalate(Step::Second));
    }

    #[test]
    fn test_acknowledged_cycle_holds_until_expiry() {
        let mut c = cycle_at(Step::First);
        c.acknowledge("ok");

        assert_eq!(evaluate(&c, true, after(900)), Transition::Hold);
        assert_eq!(
            evaluate(&c, true, after(1800)),
            Transition::Expire(ExpiryReason::Acknowledged)
        );
    }

    #[test]
    fn test_due_window() {
        assert!(!is_due(t0(), after(-1)));
        assert!(is_due(t0(), t0()));
        assert!(is_due(t0(), after(60)));
        assert!(!is_due(t0(), after(61)));
    }
}
