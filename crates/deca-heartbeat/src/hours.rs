//! Active-hours windowing with overnight wrap.

use chrono::Timelike;

use crate::error::{HeartbeatError, Result};

/// Minutes-of-day window. `start > end` means the window wraps midnight
/// (e.g. 22:00 → 06:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    start: u32,
    end: u32,
}

impl ActiveWindow {
    /// Parse `"HH:MM"` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Ok(Self {
            start: parse_hhmm(start)?,
            end: parse_hhmm(end)?,
        })
    }

    /// Inclusive containment with wrap support.
    pub fn contains_minutes(&self, minutes: u32) -> bool {
        if self.start <= self.end {
            (self.start..=self.end).contains(&minutes)
        } else {
            minutes >= self.start || minutes <= self.end
        }
    }

    /// Containment check against the local wall clock.
    pub fn contains_now(&self) -> bool {
        let now = chrono::Local::now();
        self.contains_minutes(now.hour() * 60 + now.minute())
    }
}

fn parse_hhmm(s: &str) -> Result<u32> {
    let err = || HeartbeatError::InvalidActiveHours(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(err)?;
    let h: u32 = h.parse().map_err(|_| err())?;
    let m: u32 = m.parse().map_err(|_| err())?;
    if h > 23 || m > 59 {
        return Err(err());
    }
    Ok(h * 60 + m)
}
