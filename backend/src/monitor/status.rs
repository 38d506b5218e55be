use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Outcome classification of a single heartbeat.
///
/// The numeric values are part of the storage format and of the public
/// heartbeat JSON, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[repr(i64)]
pub enum Status {
    Down = 0,
    Up = 1,
    Pending = 2,
    Maintenance = 3,
}

impl Status {
    /// MAINTENANCE counts as availability for uptime arithmetic.
    pub fn counts_as_up(self) -> bool {
        matches!(self, Status::Up | Status::Maintenance)
    }

    /// Upside-down inversion. Only UP and DOWN flip; PENDING and
    /// MAINTENANCE are never inverted.
    pub fn flipped(self) -> Status {
        match self {
            Status::Up => Status::Down,
            Status::Down => Status::Up,
            other => other,
        }
    }

    pub fn from_i64(value: i64) -> Option<Status> {
        match value {
            0 => Some(Status::Down),
            1 => Some(Status::Up),
            2 => Some(Status::Pending),
            3 => Some(Status::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Down => "Down",
            Status::Up => "Up",
            Status::Pending => "Pending",
            Status::Maintenance => "Maintenance",
        };
        f.write_str(name)
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*self as i64)
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        Status::from_i64(value)
            .ok_or_else(|| de::Error::custom(format!("invalid status value: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_only_touches_up_and_down() {
        assert_eq!(Status::Up.flipped(), Status::Down);
        assert_eq!(Status::Down.flipped(), Status::Up);
        assert_eq!(Status::Pending.flipped(), Status::Pending);
        assert_eq!(Status::Maintenance.flipped(), Status::Maintenance);
    }

    #[test]
    fn maintenance_counts_as_up() {
        assert!(Status::Up.counts_as_up());
        assert!(Status::Maintenance.counts_as_up());
        assert!(!Status::Down.counts_as_up());
        assert!(!Status::Pending.counts_as_up());
    }

    #[test]
    fn serializes_as_wire_number() {
        assert_eq!(serde_json::to_string(&Status::Maintenance).unwrap(), "3");
        let back: Status = serde_json::from_str("1").unwrap();
        assert_eq!(back, Status::Up);
    }
}
