//! Deep sleep
//!
//! [`SleepController::sleep`] stops the CPU clock until an enabled interrupt
//! fires, normally the RTC compare match armed through
//! [`Rtc`](crate::rtc::Rtc). If no interrupt is ever enabled it does not
//! return.
//!
//! [`SleepController::play_possum`] is the debugging stand-in: it spins,
//! keeping the clocks running for a debugger or USB, until the RTC
//! interrupt handler runs.

use crate::cpu::Cpu;
use crate::schedule::{SharedSchedule, SCHEDULE};

/// Puts the core into standby.
pub struct SleepController<'s, C: Cpu> {
    cpu: C,
    schedule: &'s SharedSchedule,
}

impl<C: Cpu> SleepController<'static, C> {
    /// Sleep controller released by [`crate::schedule::on_interrupt`].
    pub fn new(cpu: C) -> Self {
        Self::with_schedule(cpu, &SCHEDULE)
    }
}

impl<'s, C: Cpu> SleepController<'s, C> {
    /// Sleep controller released by the handler servicing `schedule`.
    pub fn with_schedule(cpu: C, schedule: &'s SharedSchedule) -> Self {
        SleepController { cpu, schedule }
    }

    /// Releases the core.
    pub fn free(self) -> C {
        self.cpu
    }

    /// Enter standby and wait for an interrupt.
    pub fn sleep(&mut self) {
        self.cpu.set_sleep_deep();
        self.cpu.wait_for_interrupt();
    }

    /// Spin until the RTC interrupt fires, scheduled or not.
    pub fn play_possum(&self) {
        self.schedule.enter_possum();
        while self.schedule.playing_possum() {
            core::hint::spin_loop();
        }
    }
}
