//! Normalized appointment availability, as observed by one poll.

use chrono::{DateTime, Utc};

/// Availability category for the target test center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// The portal reported no bookable slots.
    NoAppointments,
    /// One or more bookable slots, as human-readable "date at time" strings
    /// in the order the portal listed them.
    Available(Vec<String>),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

/// One normalized observation of the portal. Exactly one snapshot is
/// "current" at any time; it is replaced wholesale on the next successful
/// poll and never persisted.
#[derive(Debug, Clone)]
pub struct AppointmentSnapshot {
    pub availability: Availability,
    pub observed_at: DateTime<Utc>,
}

impl PartialEq for AppointmentSnapshot {
    fn eq(&self, other: &Self) -> bool {
        // observed_at is metadata; snapshot identity is the availability.
        self.availability == other.availability
    }
}

impl AppointmentSnapshot {
    pub fn new(availability: Availability) -> Self {
        Self {
            availability,
            observed_at: Utc::now(),
        }
    }

    /// Build a snapshot from the scraped slot list. An empty list means no
    /// appointments were offered.
    pub fn from_slots(slots: Vec<String>) -> Self {
        if slots.is_empty() {
            Self::new(Availability::NoAppointments)
        } else {
            Self::new(Availability::Available(slots))
        }
    }

    /// Slot descriptions, one per line, for notification bodies.
    pub fn slot_lines(&self) -> String {
        match &self.availability {
            Availability::NoAppointments => String::new(),
            Availability::Available(slots) => slots.join("\n"),
        }
    }
}
