//! ---
//! fleet_section: "11-simulation"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Signal generators for simulated sensor quantities."
//! fleet_version: "v0.1.0"
//! fleet_owner: "tbd"
//! ---
use std::collections::VecDeque;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("signal range for {quantity} is empty: [{start}, {end})")]
    EmptyRange {
        quantity: &'static str,
        start: f64,
        end: f64,
    },
    #[error("route must contain at least one waypoint")]
    EmptyRoute,
}

/// Produces the next value of each monitored quantity.
///
/// `scan` is the device scan counter after it was incremented for the current
/// cycle; `current` is the value the property held before the cycle.
pub trait SignalSource: Send {
    fn next_temperature(&mut self, current: f64, scan: u32) -> f64;
    fn next_pressure(&mut self, current: f64, scan: u32) -> f64;
    /// Non-negative amount added to the total flow accumulator.
    fn flow_increment(&mut self, scan: u32) -> f64;
}

/// Half-open ranges sampled by [`RandomSignals`].
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRanges {
    pub temperature: Range<f64>,
    pub pressure: Range<f64>,
}

impl SignalRanges {
    pub fn new(temperature: Range<f64>, pressure: Range<f64>) -> Result<Self, SignalError> {
        for (quantity, range) in [("temperature", &temperature), ("pressure", &pressure)] {
            // Written this way so NaN bounds are rejected too.
            if !(range.start < range.end) {
                return Err(SignalError::EmptyRange {
                    quantity,
                    start: range.start,
                    end: range.end,
                });
            }
        }
        Ok(Self {
            temperature,
            pressure,
        })
    }
}

impl Default for SignalRanges {
    fn default() -> Self {
        Self {
            temperature: 400.0..440.0,
            pressure: 18.0..23.0,
        }
    }
}

/// Bounded uniform noise around nothing in particular: every sample is drawn
/// independently from the configured range.
#[derive(Debug)]
pub struct RandomSignals {
    ranges: SignalRanges,
    rng: StdRng,
}

impl RandomSignals {
    pub fn from_seed(ranges: SignalRanges, seed: u64) -> Self {
        Self {
            ranges,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy(ranges: SignalRanges) -> Self {
        Self {
            ranges,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn ranges(&self) -> &SignalRanges {
        &self.ranges
    }
}

impl SignalSource for RandomSignals {
    fn next_temperature(&mut self, _current: f64, _scan: u32) -> f64 {
        self.rng.gen_range(self.ranges.temperature.clone())
    }

    fn next_pressure(&mut self, _current: f64, _scan: u32) -> f64 {
        self.rng.gen_range(self.ranges.pressure.clone())
    }

    fn flow_increment(&mut self, _scan: u32) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Deterministic source replaying fixed value sequences, cycling when exhausted.
/// Quantities without a script keep their current value (flow adds nothing).
#[derive(Debug, Default, Clone)]
pub struct ScriptedSignals {
    temperatures: VecDeque<f64>,
    pressures: VecDeque<f64>,
    flow_increments: VecDeque<f64>,
}

impl ScriptedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperatures(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.temperatures = values.into_iter().collect();
        self
    }

    pub fn pressures(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.pressures = values.into_iter().collect();
        self
    }

    pub fn flow_increments(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.flow_increments = values.into_iter().collect();
        self
    }

    fn cycle(values: &mut VecDeque<f64>) -> Option<f64> {
        let value = values.pop_front()?;
        values.push_back(value);
        Some(value)
    }
}

impl SignalSource for ScriptedSignals {
    fn next_temperature(&mut self, current: f64, _scan: u32) -> f64 {
        Self::cycle(&mut self.temperatures).unwrap_or(current)
    }

    fn next_pressure(&mut self, current: f64, _scan: u32) -> f64 {
        Self::cycle(&mut self.pressures).unwrap_or(current)
    }

    fn flow_increment(&mut self, _scan: u32) -> f64 {
        Self::cycle(&mut self.flow_increments).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_signals_stay_within_ranges() {
        let mut signals = RandomSignals::from_seed(SignalRanges::default(), 42);
        for scan in 1..=500 {
            let temperature = signals.next_temperature(0.0, scan);
            assert!((400.0..440.0).contains(&temperature));
            let pressure = signals.next_pressure(0.0, scan);
            assert!((18.0..23.0).contains(&pressure));
            let flow = signals.flow_increment(scan);
            assert!((0.0..1.0).contains(&flow));
        }
    }

    #[test]
    fn equal_seeds_produce_equal_sequences() {
        let mut a = RandomSignals::from_seed(SignalRanges::default(), 7);
        let mut b = RandomSignals::from_seed(SignalRanges::default(), 7);
        for scan in 1..=20 {
            assert_eq!(a.next_temperature(0.0, scan), b.next_temperature(0.0, scan));
            assert_eq!(a.flow_increment(scan), b.flow_increment(scan));
        }
    }

    #[test]
    fn scripted_signals_cycle_and_fall_back() {
        let mut signals = ScriptedSignals::new().temperatures([160.0, 140.0]);
        assert_eq!(signals.next_temperature(0.0, 1), 160.0);
        assert_eq!(signals.next_temperature(0.0, 2), 140.0);
        assert_eq!(signals.next_temperature(0.0, 3), 160.0);
        assert_eq!(signals.next_pressure(19.5, 2), 19.5);
        assert_eq!(signals.flow_increment(3), 0.0);
    }

    #[test]
    fn empty_ranges_are_rejected() {
        let err = SignalRanges::new(440.0..400.0, 18.0..23.0).unwrap_err();
        assert_eq!(
            err,
            SignalError::EmptyRange {
                quantity: "temperature",
                start: 440.0,
                end: 400.0
            }
        );
        assert!(SignalRanges::new(400.0..440.0, f64::NAN..23.0).is_err());
    }
}
