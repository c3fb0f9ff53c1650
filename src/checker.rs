//! State-change detection for the poll loop.
//!
//! `CheckerState` owns the last-known snapshot and the current failure
//! streak; each observation returns the notifications the loop should send.
//! The logic here is pure so the notification laws can be tested without a
//! browser or a Discord channel.

use crate::config::CompareKey;
use crate::snapshot::{AppointmentSnapshot, Availability};

const BOOKING_URL: &str = "https://onlinebusiness.icbc.com/webdeas-ui/booking";

/// A planned outbound message. Rendering to text happens at dispatch time so
/// the comparison logic stays independent of wording.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// First successful poll: announce the current status whatever it is.
    Baseline(AppointmentSnapshot),
    /// Availability went from none to some slots.
    BecameAvailable(AppointmentSnapshot),
    /// Availability went from some slots to none.
    NoLongerAvailable,
    /// Still available, but the slot list changed.
    SlotsChanged(AppointmentSnapshot),
    /// First failure of a streak.
    CheckFailed(String),
    /// First success after a failure streak.
    Recovered,
}

/// Check time as shown in message bodies.
fn checked_at(snapshot: &AppointmentSnapshot) -> String {
    snapshot.observed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl Notification {
    /// Render the message body sent to the channel.
    pub fn render(&self, location: &str, interval_minutes: u64) -> String {
        match self {
            Notification::Baseline(snapshot) => match &snapshot.availability {
                Availability::NoAppointments => format!(
                    "**ICBC appointment check** ({})\n\
                     No road test appointments currently available at {location}.\n\
                     I'll keep checking every {interval_minutes} minutes and notify you of any change.",
                    checked_at(snapshot)
                ),
                Availability::Available(_) => format!(
                    "**ICBC appointment check** ({})\n\
                     Road test appointments currently available at {location}:\n{}\n\
                     Book at: {BOOKING_URL}",
                    checked_at(snapshot),
                    snapshot.slot_lines()
                ),
            },
            Notification::BecameAvailable(snapshot) => format!(
                "**New ICBC road test appointments available at {location}!** ({})\n{}\n\
                 Book now: {BOOKING_URL}",
                checked_at(snapshot),
                snapshot.slot_lines()
            ),
            Notification::NoLongerAvailable => format!(
                "Road test appointments at {location} are no longer available.\n\
                 I'll keep checking every {interval_minutes} minutes."
            ),
            Notification::SlotsChanged(snapshot) => format!(
                "Appointment availability changed at {location} ({}):\n{}\n\
                 Book at: {BOOKING_URL}",
                checked_at(snapshot),
                snapshot.slot_lines()
            ),
            Notification::CheckFailed(reason) => format!(
                "**ICBC checker error**\n\
                 Failed to check appointments: {reason}\n\
                 I'll retry every {interval_minutes} minutes and let you know when checks recover."
            ),
            Notification::Recovered => {
                "ICBC appointment checks have recovered.".to_string()
            }
        }
    }
}

/// Loop-owned state: the single current snapshot plus the failure streak.
/// No process-wide singleton; `main` builds one and hands it to the
/// scheduler.
#[derive(Debug, Default)]
pub struct CheckerState {
    last: Option<AppointmentSnapshot>,
    failure_streak: u32,
}

impl CheckerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_snapshot(&self) -> Option<&AppointmentSnapshot> {
        self.last.as_ref()
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Record a successful poll and plan the resulting notifications.
    /// The new snapshot becomes current whether or not anything is sent.
    pub fn observe_success(
        &mut self,
        snapshot: AppointmentSnapshot,
        compare_key: CompareKey,
    ) -> Vec<Notification> {
        let mut planned = Vec::new();

        if self.failure_streak > 0 {
            planned.push(Notification::Recovered);
            self.failure_streak = 0;
        }

        match &self.last {
            None => planned.push(Notification::Baseline(snapshot.clone())),
            Some(prev) => match (&prev.availability, &snapshot.availability) {
                (Availability::NoAppointments, Availability::Available(_)) => {
                    planned.push(Notification::BecameAvailable(snapshot.clone()));
                }
                (Availability::Available(_), Availability::NoAppointments) => {
                    planned.push(Notification::NoLongerAvailable);
                }
                (Availability::Available(old), Availability::Available(new))
                    if old != new && compare_key == CompareKey::FullSnapshot =>
                {
                    planned.push(Notification::SlotsChanged(snapshot.clone()));
                }
                _ => {}
            },
        }

        self.last = Some(snapshot);
        planned
    }

    /// Record a failed poll. Notifies only at the start of a streak; the
    /// last snapshot is left untouched.
    pub fn observe_failure(&mut self, reason: &str) -> Option<Notification> {
        self.failure_streak += 1;
        if self.failure_streak == 1 {
            Some(Notification::CheckFailed(reason.to_string()))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none_available() -> AppointmentSnapshot {
        AppointmentSnapshot::from_slots(vec![])
    }

    fn available(slots: &[&str]) -> AppointmentSnapshot {
        AppointmentSnapshot::from_slots(slots.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn first_successful_poll_always_announces_baseline() {
        for snapshot in [none_available(), available(&["May 10 at 10:15 AM"])] {
            let mut state = CheckerState::new();
            let planned = state.observe_success(snapshot.clone(), CompareKey::FullSnapshot);
            assert_eq!(planned, vec![Notification::Baseline(snapshot)]);
        }
    }

    #[test]
    fn identical_snapshots_are_silent() {
        let mut state = CheckerState::new();
        state.observe_success(available(&["May 10 at 10:15 AM"]), CompareKey::FullSnapshot);
        let planned =
            state.observe_success(available(&["May 10 at 10:15 AM"]), CompareKey::FullSnapshot);
        assert!(planned.is_empty());

        let mut state = CheckerState::new();
        state.observe_success(none_available(), CompareKey::FullSnapshot);
        assert!(state
            .observe_success(none_available(), CompareKey::FullSnapshot)
            .is_empty());
    }

    #[test]
    fn transition_to_available_fires_once_with_details() {
        let mut state = CheckerState::new();
        state.observe_success(none_available(), CompareKey::FullSnapshot);

        let snapshot = available(&["May 10 at 10:15 AM", "May 11 at 8:30 AM"]);
        let planned = state.observe_success(snapshot.clone(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::BecameAvailable(snapshot.clone())]);

        // Unchanged on the next poll: nothing further.
        assert!(state
            .observe_success(snapshot, CompareKey::FullSnapshot)
            .is_empty());
    }

    #[test]
    fn transition_away_from_available_fires_no_longer_available() {
        let mut state = CheckerState::new();
        state.observe_success(available(&["May 10 at 10:15 AM"]), CompareKey::FullSnapshot);
        let planned = state.observe_success(none_available(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::NoLongerAvailable]);
    }

    #[test]
    fn slot_change_within_available_notifies_under_full_compare() {
        let mut state = CheckerState::new();
        state.observe_success(available(&["May 10 at 10:15 AM"]), CompareKey::FullSnapshot);

        let changed = available(&["May 10 at 10:15 AM", "May 12 at 1:00 PM"]);
        let planned = state.observe_success(changed.clone(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::SlotsChanged(changed)]);
    }

    #[test]
    fn slot_change_is_silent_under_status_only_compare() {
        let mut state = CheckerState::new();
        state.observe_success(available(&["May 10 at 10:15 AM"]), CompareKey::StatusOnly);
        let planned =
            state.observe_success(available(&["May 12 at 1:00 PM"]), CompareKey::StatusOnly);
        assert!(planned.is_empty());
    }

    #[test]
    fn at_most_one_error_notification_per_failure_streak() {
        let mut state = CheckerState::new();
        assert!(matches!(
            state.observe_failure("timeout"),
            Some(Notification::CheckFailed(_))
        ));
        assert_eq!(state.observe_failure("timeout"), None);
        assert_eq!(state.observe_failure("timeout"), None);
        assert_eq!(state.failure_streak(), 3);
    }

    #[test]
    fn recovery_fires_exactly_once_after_a_streak() {
        let mut state = CheckerState::new();
        state.observe_success(none_available(), CompareKey::FullSnapshot);
        state.observe_failure("timeout");
        state.observe_failure("timeout");

        let planned = state.observe_success(none_available(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::Recovered]);

        // Streak is reset; a plain repeat stays silent.
        assert!(state
            .observe_success(none_available(), CompareKey::FullSnapshot)
            .is_empty());
    }

    #[test]
    fn failure_retains_last_snapshot() {
        let mut state = CheckerState::new();
        let snapshot = available(&["May 10 at 10:15 AM"]);
        state.observe_success(snapshot.clone(), CompareKey::FullSnapshot);
        state.observe_failure("browser crashed");
        assert_eq!(state.last_snapshot(), Some(&snapshot));
        assert_eq!(state.failure_streak(), 1);
    }

    /// Five-poll walk through the whole lifecycle: baseline, silence,
    /// availability, failure with retained snapshot, recovery plus loss.
    #[test]
    fn full_lifecycle_scenario() {
        let mut state = CheckerState::new();

        // Poll 1: baseline "no appointments".
        let planned = state.observe_success(none_available(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::Baseline(none_available())]);

        // Poll 2: unchanged, silent.
        assert!(state
            .observe_success(none_available(), CompareKey::FullSnapshot)
            .is_empty());

        // Poll 3: appointments appear.
        let open = available(&["May 10"]);
        let planned = state.observe_success(open.clone(), CompareKey::FullSnapshot);
        assert_eq!(planned, vec![Notification::BecameAvailable(open.clone())]);

        // Poll 4: adapter failure, one notification, snapshot retained.
        assert!(state.observe_failure("login timeout").is_some());
        assert_eq!(
            state.last_snapshot().unwrap().availability,
            open.availability
        );

        // Poll 5: success again, now empty: recovery then loss.
        let planned = state.observe_success(none_available(), CompareKey::FullSnapshot);
        assert_eq!(
            planned,
            vec![Notification::Recovered, Notification::NoLongerAvailable]
        );
    }

    #[test]
    fn rendered_messages_carry_details_and_booking_link() {
        let snapshot = available(&["May 10 at 10:15 AM"]);
        let body = Notification::BecameAvailable(snapshot).render("Richmond", 5);
        assert!(body.contains("May 10 at 10:15 AM"));
        assert!(body.contains("Richmond"));
        assert!(body.contains(BOOKING_URL));

        let body = Notification::CheckFailed("timeout".to_string()).render("Richmond", 5);
        assert!(body.contains("timeout"));
        assert!(body.contains("every 5 minutes"));
    }

    #[test]
    fn rendered_messages_carry_the_observation_time() {
        let snapshot = available(&["May 10 at 10:15 AM"]);
        let stamp = snapshot.observed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();

        for notification in [
            Notification::Baseline(snapshot.clone()),
            Notification::BecameAvailable(snapshot.clone()),
            Notification::SlotsChanged(snapshot),
        ] {
            let body = notification.render("Richmond", 5);
            assert!(body.contains(&stamp), "missing check time in: {body}");
        }
    }
}
