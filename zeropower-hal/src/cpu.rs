//! Cortex-M0+ core control used by the RTC and sleep code

use cortex_m::peripheral::{NVIC, SCB};

use crate::arch;
use crate::pac::{Interrupt, NVIC_PRIO_BITS};

/// The core operations needed to wire up and wait for the RTC interrupt.
pub trait Cpu {
    /// Unmask `irq` in the NVIC at `priority`, 0 being the most urgent.
    fn enable_interrupt(&mut self, irq: Interrupt, priority: u8);
    /// Make the next wait for interrupt enter deep sleep (standby).
    fn set_sleep_deep(&mut self);
    /// Suspend until an enabled interrupt fires.
    fn wait_for_interrupt(&mut self);
}

/// The NVIC and SCB of the Cortex-M0+ core.
pub struct CortexM0Plus {
    nvic: NVIC,
    scb: SCB,
}

impl CortexM0Plus {
    /// Takes ownership of the core peripherals.
    pub fn new(nvic: NVIC, scb: SCB) -> Self {
        CortexM0Plus { nvic, scb }
    }

    /// Releases the core peripherals.
    pub fn free(self) -> (NVIC, SCB) {
        (self.nvic, self.scb)
    }
}

impl Cpu for CortexM0Plus {
    fn enable_interrupt(&mut self, irq: Interrupt, priority: u8) {
        let priority = priority << (8 - NVIC_PRIO_BITS);
        // Safety: the interrupt is only unmasked once its peripheral is
        // configured; the handler is supplied by the application.
        unsafe {
            self.nvic.set_priority(irq, priority);
            NVIC::unmask(irq);
        }
    }

    fn set_sleep_deep(&mut self) {
        self.scb.set_sleepdeep();
    }

    fn wait_for_interrupt(&mut self) {
        arch::dsb();
        arch::wfi();
    }
}
