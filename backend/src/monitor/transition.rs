//! Pure classification of status transitions.
//!
//! A beat is *important* when it changes log-worthy state, and
//! *important for notify* for the subset of transitions that should page
//! someone. Transitions into maintenance are logged but never notified;
//! coming out of maintenance notifies only when the service is found down.

use super::status::Status;

/// True when the transition `prev -> curr` should be recorded as an
/// important beat. The very first beat of a monitor is always important.
pub fn is_important(first_beat: bool, prev: Option<Status>, curr: Status) -> bool {
    use Status::*;

    if first_beat {
        return true;
    }
    matches!(
        (prev, curr),
        (Some(Up), Down)
            | (Some(Down), Up)
            | (Some(Pending), Down)
            | (Some(Up), Maintenance)
            | (Some(Down), Maintenance)
            | (Some(Maintenance), Up)
            | (Some(Maintenance), Down)
    )
}

/// True when the transition should fire notifications. Strictly a subset
/// of [`is_important`].
pub fn is_important_for_notify(first_beat: bool, prev: Option<Status>, curr: Status) -> bool {
    use Status::*;

    if first_beat {
        return true;
    }
    matches!(
        (prev, curr),
        (Some(Up), Down) | (Some(Down), Up) | (Some(Pending), Down) | (Some(Maintenance), Down)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    const ALL: [Status; 4] = [Down, Up, Pending, Maintenance];

    #[test]
    fn first_beat_is_always_important_and_notifies() {
        for curr in ALL {
            assert!(is_important(true, None, curr));
            assert!(is_important_for_notify(true, None, curr));
        }
    }

    #[test]
    fn up_down_flaps_are_important_and_notify() {
        assert!(is_important(false, Some(Up), Down));
        assert!(is_important_for_notify(false, Some(Up), Down));
        assert!(is_important(false, Some(Down), Up));
        assert!(is_important_for_notify(false, Some(Down), Up));
    }

    #[test]
    fn pending_resolution() {
        // Failing through PENDING into DOWN is a notified transition,
        // but staying PENDING or entering PENDING is not important.
        assert!(is_important(false, Some(Pending), Down));
        assert!(is_important_for_notify(false, Some(Pending), Down));
        assert!(!is_important(false, Some(Up), Pending));
        assert!(!is_important(false, Some(Pending), Pending));
        assert!(!is_important(false, Some(Pending), Up));
    }

    #[test]
    fn maintenance_transitions_log_but_mostly_do_not_notify() {
        for prev in [Up, Down] {
            assert!(is_important(false, Some(prev), Maintenance));
            assert!(!is_important_for_notify(false, Some(prev), Maintenance));
        }
        assert!(is_important(false, Some(Maintenance), Up));
        assert!(!is_important_for_notify(false, Some(Maintenance), Up));
        assert!(is_important(false, Some(Maintenance), Down));
        assert!(is_important_for_notify(false, Some(Maintenance), Down));
    }

    #[test]
    fn steady_states_are_not_important() {
        for status in ALL {
            assert!(!is_important(false, Some(status), status));
        }
    }

    #[test]
    fn notify_implies_important() {
        for prev in ALL {
            for curr in ALL {
                if is_important_for_notify(false, Some(prev), curr) {
                    assert!(is_important(false, Some(prev), curr));
                }
            }
        }
    }
}
