//! Current draw of the CPU clock sources
//!
//! Reference figures to pick a [`ClockSource`] by. The oscillator currents
//! are the typical values of the SAM D21 datasheet electrical
//! characteristics; the board currents were measured on an Arduino Zero
//! class board running a busy loop with its peripherals disabled.

use fugit::HertzU32;

use crate::clocks::ClockSource;

/// Power figures of one clock source.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OscillatorPowerState {
    /// The source described.
    pub source: ClockSource,
    /// Nominal CPU frequency when running from it.
    pub frequency: HertzU32,
    /// Current drawn by the oscillator itself, in µA.
    pub oscillator_current_ua: u32,
    /// Current drawn by the whole board in a busy loop, in µA.
    pub board_current_ua: u32,
}

/// Every source, fastest first.
pub const POWER_STATES: [OscillatorPowerState; 3] = [
    ClockSource::FastSynthesized.power_state(),
    ClockSource::MediumOscillator.power_state(),
    ClockSource::SlowCrystal.power_state(),
];

impl ClockSource {
    /// Reference power figures of this source.
    pub const fn power_state(self) -> OscillatorPowerState {
        let (oscillator_current_ua, board_current_ua) = match self {
            ClockSource::FastSynthesized => (400, 7_900),
            ClockSource::MediumOscillator => (64, 1_400),
            ClockSource::SlowCrystal => (2, 200),
        };
        OscillatorPowerState {
            source: self,
            frequency: self.frequency(),
            oscillator_current_ua,
            board_current_ua,
        }
    }
}

/// The source with the lowest board current which still runs the CPU at
/// `min_frequency` or faster.
pub fn cheapest_source_for(min_frequency: HertzU32) -> Option<ClockSource> {
    POWER_STATES
        .iter()
        .filter(|state| state.frequency >= min_frequency)
        .min_by_key(|state| state.board_current_ua)
        .map(|state| state.source)
}
