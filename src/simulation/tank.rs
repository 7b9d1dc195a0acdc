// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-tank-control project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Physical model of the water tank

use std::fmt;

/// Lowest tank level
pub const MIN_LEVEL: u16 = 0;

/// Highest tank level
pub const MAX_LEVEL: u16 = 1000;

/// Level units added per tick while the pump runs
pub const PUMP_RATE: i32 = 5;

/// Level units removed per tick while the drain valve is open
pub const DRAIN_RATE: i32 = 3;

/// Level change for one tick given the actuator states
pub fn level_delta(pump_on: bool, valve_open: bool) -> i32 {
    let inflow = if pump_on { PUMP_RATE } else { 0 };
    let outflow = if valve_open { DRAIN_RATE } else { 0 };
    inflow - outflow
}

/// Advance the tank by one tick, clamping to `[MIN_LEVEL, MAX_LEVEL]`
pub fn next_level(level: u16, pump_on: bool, valve_open: bool) -> u16 {
    let level = i32::from(level) + level_delta(pump_on, valve_open);
    level.clamp(i32::from(MIN_LEVEL), i32::from(MAX_LEVEL)) as u16
}

/// Level thresholds announced once per entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdReport {
    Empty,
    HalfFull,
    Full,
}

impl fmt::Display for ThresholdReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdReport::Empty => write!(f, "Tank Empty"),
            ThresholdReport::HalfFull => write!(f, "Tank Half Full"),
            ThresholdReport::Full => write!(f, "Tank Full"),
        }
    }
}

/// State owned by the simulation loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankState {
    pub level: u16,
    pub pump_on: bool,
    pub valve_open: bool,
    /// Last threshold announced, cleared once the level is strictly between
    /// the bounds again
    pub last_threshold_report: Option<ThresholdReport>,
}

impl TankState {
    pub fn new(level: u16) -> Self {
        Self {
            level,
            pump_on: false,
            valve_open: false,
            last_threshold_report: None,
        }
    }

    /// Record `new_level` and return the threshold to announce, if any.
    ///
    /// The checks run in a fixed order (empty, half, full, in-between) and
    /// only the first matching branch applies. Sitting on the half mark does
    /// not count as being in-between.
    pub fn observe_level(&mut self, new_level: u16) -> Option<ThresholdReport> {
        self.level = new_level;
        let last = self.last_threshold_report;

        if new_level == MIN_LEVEL && last != Some(ThresholdReport::Empty) {
            self.last_threshold_report = Some(ThresholdReport::Empty);
        } else if new_level == MAX_LEVEL / 2 && last != Some(ThresholdReport::HalfFull) {
            self.last_threshold_report = Some(ThresholdReport::HalfFull);
        } else if new_level == MAX_LEVEL && last != Some(ThresholdReport::Full) {
            self.last_threshold_report = Some(ThresholdReport::Full);
        } else {
            if MIN_LEVEL < new_level && new_level < MAX_LEVEL && new_level != MAX_LEVEL / 2 {
                self.last_threshold_report = None;
            }
            return None;
        }

        self.last_threshold_report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_matches_actuators() {
        assert_eq!(level_delta(false, false), 0);
        assert_eq!(level_delta(true, false), 5);
        assert_eq!(level_delta(false, true), -3);
        assert_eq!(level_delta(true, true), 2);
    }

    #[test]
    fn test_level_is_clamped() {
        assert_eq!(next_level(998, true, false), 1000);
        assert_eq!(next_level(1000, true, false), 1000);
        assert_eq!(next_level(2, false, true), 0);
        assert_eq!(next_level(0, false, true), 0);
        assert_eq!(next_level(500, true, true), 502);
    }

    #[test]
    fn test_repeated_pumping_stays_in_range() {
        let mut level = 500;
        for _ in 0..500 {
            level = next_level(level, true, false);
            assert!(level <= MAX_LEVEL);
        }
        assert_eq!(level, MAX_LEVEL);
        for _ in 0..500 {
            level = next_level(level, false, true);
        }
        assert_eq!(level, MIN_LEVEL);
    }

    #[test]
    fn test_threshold_fires_once_per_entry() {
        let mut state = TankState::new(995);
        assert_eq!(state.observe_level(1000), Some(ThresholdReport::Full));
        assert_eq!(state.observe_level(1000), None);
        assert_eq!(state.observe_level(1000), None);

        // Leaving the bound re-arms the report
        assert_eq!(state.observe_level(997), None);
        assert_eq!(state.last_threshold_report, None);
        assert_eq!(state.observe_level(1000), Some(ThresholdReport::Full));
    }

    #[test]
    fn test_half_full_reported_when_passing_through() {
        let mut state = TankState::new(495);
        assert_eq!(state.observe_level(500), Some(ThresholdReport::HalfFull));
        for _ in 0..5 {
            assert_eq!(state.observe_level(500), None);
        }
        assert_eq!(state.last_threshold_report, Some(ThresholdReport::HalfFull));

        assert_eq!(state.observe_level(503), None);
        assert_eq!(state.last_threshold_report, None);
        assert_eq!(state.observe_level(500), Some(ThresholdReport::HalfFull));
    }

    #[test]
    fn test_empty_then_full_sequence() {
        let mut state = TankState::new(3);
        assert_eq!(state.observe_level(0), Some(ThresholdReport::Empty));
        assert_eq!(state.observe_level(0), None);
        assert_eq!(state.last_threshold_report, Some(ThresholdReport::Empty));
        assert_eq!(state.observe_level(5), None);
        assert_eq!(state.last_threshold_report, None);
    }

    #[test]
    fn test_report_labels() {
        assert_eq!(ThresholdReport::Empty.to_string(), "Tank Empty");
        assert_eq!(ThresholdReport::HalfFull.to_string(), "Tank Half Full");
        assert_eq!(ThresholdReport::Full.to_string(), "Tank Full");
    }
}
