use std::fmt;
use std::sync::Mutex;

use serde::Serialize;

pub const ANGLE_COUNT: usize = 4;
pub const MAX_ANGLE: u16 = 180;

pub const IDLE_STATUS: &str = "waiting for angles";
pub const RECEIVED_STATUS: &str = "angles received";

/// Four per-axis targets in degrees, only constructible through validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AngleSet([u16; ANGLE_COUNT]);

impl AngleSet {
    /// Validates a raw request payload. The whole set is rejected on the
    /// first offending value; the message names its index and value.
    pub fn try_from_degrees(values: &[f64]) -> Result<Self, String> {
        if values.len() != ANGLE_COUNT {
            return Err(format!(
                "need exactly {ANGLE_COUNT} angle values, got {}",
                values.len()
            ));
        }

        let mut angles = [0u16; ANGLE_COUNT];
        for (i, &value) in values.iter().enumerate() {
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(format!("angle {} is not a whole number: {value}", i + 1));
            }
            if value < 0.0 || value > f64::from(MAX_ANGLE) {
                return Err(format!(
                    "angle {} out of range (0-{MAX_ANGLE}): {value}",
                    i + 1
                ));
            }
            angles[i] = value as u16;
        }

        Ok(Self(angles))
    }

    pub fn values(&self) -> [u16; ANGLE_COUNT] {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for AngleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "[{a}, {b}, {c}, {d}]")
    }
}

/// What `GET /api/get_status` reports.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub angles: Option<[u16; ANGLE_COUNT]>,
    pub timestamp: Option<String>,
    pub status: String,
}

#[derive(Debug)]
struct AngleRecord {
    angles: Option<AngleSet>,
    timestamp: Option<String>,
    status: String,
    consumed: bool,
}

impl AngleRecord {
    fn idle() -> Self {
        Self {
            angles: None,
            timestamp: None,
            status: IDLE_STATUS.into(),
            consumed: false,
        }
    }
}

/// The single shared angle slot. The web layer writes it, the sequencer
/// reads it; last writer wins. A stored set is handed to the sequencer at
/// most once per submission, but stays visible to the status endpoint
/// until cleared or overwritten.
#[derive(Debug)]
pub struct AngleStore {
    inner: Mutex<AngleRecord>,
}

impl AngleStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AngleRecord::idle()),
        }
    }

    pub fn set(&self, angles: AngleSet) {
        let mut record = self.inner.lock().unwrap();
        record.angles = Some(angles);
        record.timestamp = Some(now_stamp());
        record.status = RECEIVED_STATUS.into();
        record.consumed = false;
    }

    pub fn set_status(&self, status: &str) {
        self.inner.lock().unwrap().status = status.into();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let record = self.inner.lock().unwrap();
        StatusSnapshot {
            angles: record.angles.map(|set| set.values()),
            timestamp: record.timestamp.clone(),
            status: record.status.clone(),
        }
    }

    /// The stored set, if one arrived since the last call. Marks it
    /// consumed without clearing it.
    pub fn take_fresh(&self) -> Option<AngleSet> {
        let mut record = self.inner.lock().unwrap();
        if record.consumed {
            return None;
        }
        let angles = record.angles?;
        record.consumed = true;
        Some(angles)
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap() = AngleRecord::idle();
    }
}

impl Default for AngleStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_full_valid_set() {
        let set = AngleSet::try_from_degrees(&[90.0, 45.0, 135.0, 60.0]).unwrap();
        assert_eq!(set.values(), [90, 45, 135, 60]);
    }

    #[test]
    fn accepts_the_boundaries() {
        let set = AngleSet::try_from_degrees(&[0.0, 180.0, 0.0, 180.0]).unwrap();
        assert_eq!(set.values(), [0, 180, 0, 180]);
    }

    #[test]
    fn rejects_out_of_range_wholesale() {
        let err = AngleSet::try_from_degrees(&[90.0, 45.0, 181.0, 60.0]).unwrap_err();
        assert!(err.contains("angle 3"), "unexpected message: {err}");
    }

    #[test]
    fn rejects_wrong_count_and_fractions() {
        assert!(AngleSet::try_from_degrees(&[90.0, 45.0, 60.0]).is_err());
        assert!(AngleSet::try_from_degrees(&[90.0, 45.0, 60.0, 30.0, 10.0]).is_err());
        assert!(AngleSet::try_from_degrees(&[90.5, 45.0, 60.0, 30.0]).is_err());
        assert!(AngleSet::try_from_degrees(&[f64::NAN, 45.0, 60.0, 30.0]).is_err());
        assert!(AngleSet::try_from_degrees(&[-1.0, 45.0, 60.0, 30.0]).is_err());
    }

    #[test]
    fn rejected_input_leaves_state_unchanged() {
        let store = AngleStore::new();
        store.set(AngleSet::try_from_degrees(&[10.0, 20.0, 30.0, 40.0]).unwrap());
        let before = store.snapshot();

        assert!(AngleSet::try_from_degrees(&[90.0, 45.0, 181.0, 60.0]).is_err());

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn round_trips_through_the_store() {
        let store = AngleStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.angles, None);
        assert_eq!(snapshot.timestamp, None);
        assert_eq!(snapshot.status, IDLE_STATUS);

        store.set(AngleSet::try_from_degrees(&[90.0, 45.0, 135.0, 60.0]).unwrap());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.angles, Some([90, 45, 135, 60]));
        assert!(snapshot.timestamp.is_some());
    }

    #[test]
    fn clear_always_resets_to_idle() {
        let store = AngleStore::new();
        store.set(AngleSet::try_from_degrees(&[1.0, 2.0, 3.0, 4.0]).unwrap());
        store.set_status("mid-sequence");

        store.clear();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.angles, None);
        assert_eq!(snapshot.timestamp, None);
        assert_eq!(snapshot.status, IDLE_STATUS);
    }

    #[test]
    fn a_submission_is_taken_at_most_once() {
        let store = AngleStore::new();
        assert_eq!(store.take_fresh(), None);

        let set = AngleSet::try_from_degrees(&[5.0, 6.0, 7.0, 8.0]).unwrap();
        store.set(set);

        assert_eq!(store.take_fresh(), Some(set));
        assert_eq!(store.take_fresh(), None);
        // still visible to the status endpoint
        assert!(store.snapshot().angles.is_some());

        // a new submission is fresh again
        store.set(set);
        assert_eq!(store.take_fresh(), Some(set));
    }
}
