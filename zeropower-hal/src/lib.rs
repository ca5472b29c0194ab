//! Low power operating modes for the SAM D21 microcontroller
//!
//! Trade CPU clock speed for current draw, switch off unused pins and the
//! USB module, keep time and schedule wakeups with the RTC while the core
//! is stopped, and put the core into standby.
//!
//! The typical cycle is:
//!
//! 1. pick a clock source with [`clocks::ClockController::set_cpu_clock`],
//! 2. arm a wakeup with [`rtc::Rtc::schedule_every`] or [`rtc::Rtc::schedule_at`],
//! 3. suspend with [`sleep::SleepController::sleep`],
//!
//! with [`schedule::on_interrupt`] called from the application's `RTC`
//! interrupt handler.
//!
//! # Crate features
//!
//! * **rt** -
//!   Minimal startup / runtime for Cortex-M microcontrollers, through the PAC
//! * **critical-section-impl** -
//!   critical section for single core use, from `cortex-m`
//! * **defmt** -
//!   Implement `defmt::Format` for several types, and log clock switches
//!   and RTC scheduling.

#![warn(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

pub extern crate atsamd21g as pac;

pub use fugit;

pub mod arch;
pub mod clocks;
pub mod cpu;
pub mod ports;
pub mod power;
pub mod rtc;
pub mod schedule;
pub mod sleep;
#[cfg(test)]
mod testing;
pub mod wait;

pub use clocks::{ClockController, ClockSource};
pub use rtc::Rtc;
pub use sleep::SleepController;
