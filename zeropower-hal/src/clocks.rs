//! CPU clock source switching
//!
//! Only the output of generic clock generator 0 (GCLK_MAIN) is changed. Any
//! peripheral fed from that generator (SysTick in a plain Arduino-style
//! setup) slows down with the CPU.
//!
//! Leaving the 48 MHz DFLL for one of the always-running low-power
//! oscillators is a single generator write followed by dropping the flash
//! wait states and powering the DFLL down. Coming back is the delicate
//! direction: the DFLL has to be re-referenced to the 32 kHz crystal,
//! re-locked in closed loop mode, and only then handed to the CPU.
//!
//! ## Usage
//! ```no_run
//! use zeropower_hal::clocks::{ClockController, ClockSource};
//! use zeropower_hal::pac;
//!
//! let p = pac::Peripherals::take().unwrap();
//! let mut clocks = ClockController::new(p.GCLK, p.SYSCTRL, p.NVMCTRL);
//!
//! clocks.set_cpu_clock(ClockSource::SlowCrystal).unwrap();
//! // ... low power work ...
//! clocks.set_cpu_clock(ClockSource::FastSynthesized).unwrap();
//! ```

use core::convert::Infallible;

use fugit::HertzU32;
use nb::Error::WouldBlock;

use crate::pac::{GCLK, NVMCTRL, SYSCTRL};
use crate::wait::{await_condition, WaitPolicy};

/// The three clock sources the CPU can run from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// DFLL48M locked to the 32.768 kHz crystal, 48 MHz.
    FastSynthesized,
    /// OSC8M internal oscillator, 8 MHz.
    MediumOscillator,
    /// XOSC32K external crystal, 32.768 kHz.
    SlowCrystal,
}

impl ClockSource {
    /// Nominal frequency of the source.
    pub const fn frequency(self) -> HertzU32 {
        match self {
            ClockSource::FastSynthesized => HertzU32::MHz(48),
            ClockSource::MediumOscillator => HertzU32::MHz(8),
            ClockSource::SlowCrystal => HertzU32::Hz(32_768),
        }
    }

    /// Flash wait states needed to run from this source.
    pub const fn wait_states(self) -> FlashWaitStates {
        match self {
            ClockSource::FastSynthesized => FlashWaitStates::One,
            ClockSource::MediumOscillator | ClockSource::SlowCrystal => FlashWaitStates::Zero,
        }
    }
}

/// Value of the NVMCTRL CTRLB.RWS field.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FlashWaitStates {
    /// No wait state (`SINGLE`), safe up to 24 MHz at 3.3 V.
    Zero = 0,
    /// One wait state (`HALF`), needed at 48 MHz.
    One = 1,
}

/// Closed loop parameters of the DFLL48M.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FastClockLockParameters {
    /// Ratio between the DFLL output and its reference clock.
    pub multiplier: u16,
    /// Maximum coarse adjustment step while locking (6 bits).
    pub coarse_step: u8,
    /// Maximum fine adjustment step while locking (10 bits).
    pub fine_step: u16,
}

impl FastClockLockParameters {
    /// The startup configuration of the Arduino Zero core: both steps at
    /// half their maximum, 48 MHz multiplied up from the 32.768 kHz crystal.
    pub const ARDUINO_DEFAULT: FastClockLockParameters = FastClockLockParameters {
        multiplier: (48_000_000u32 / 32_768u32) as u16,
        coarse_step: 31,
        fine_step: 511,
    };

    /// Frequency the DFLL settles at once locked to `reference`.
    pub const fn output_frequency(&self, reference: HertzU32) -> HertzU32 {
        HertzU32::from_raw(reference.raw() * self.multiplier as u32)
    }
}

/// The steps of the switch back to the DFLL that wait on hardware.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockStage {
    /// Routing generator 1 to the DFLL reference input.
    ReferenceAttach,
    /// DFLL enabled in open loop mode.
    OpenLoopReady,
    /// Multiplier and step sizes written.
    MultiplierReady,
    /// Closed loop mode configured.
    ClosedLoopReady,
    /// Coarse and fine lock acquired.
    Locked,
    /// Generator 0 division and source written.
    GeneratorSwitch,
}

/// Errors raised by [`ClockController`] when a bounded [`WaitPolicy`] is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A status wait of the DFLL switch-over ran out of polls.
    ClockLockTimeout(LockStage),
}

/// DFLL bits of SYSCTRL PCLKSR.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DfllStatus {
    /// DFLLRDY: the DFLL accepts register writes.
    pub ready: bool,
    /// DFLLLCKC: coarse lock acquired.
    pub coarse_locked: bool,
    /// DFLLLCKF: fine lock acquired.
    pub fine_locked: bool,
}

/// Register level operations needed to switch the CPU clock.
pub trait ClockRegisters {
    /// Point generic clock generator 0 at `source`, with IDC and GENEN set.
    fn select_main_source(&self, source: ClockSource);
    /// Run generator 0 undivided.
    fn reset_main_divider(&self);
    /// Feed the DFLL48M reference input from generator 1.
    fn attach_dfll_reference(&self);
    /// Feed GCLK_RTC from generator 1.
    fn attach_rtc_clock(&self);
    /// GCLK STATUS.SYNCBUSY.
    fn generator_sync_busy(&self) -> bool;
    /// Update the NVMCTRL CTRLB.RWS field, leaving the rest of CTRLB alone.
    fn set_wait_states(&self, wait_states: FlashWaitStates);
    /// DFLLCTRL: ENABLE only, so open loop and not on demand.
    fn enable_dfll_open_loop(&self);
    /// DFLLMUL from `lock`.
    fn write_dfll_multiplier(&self, lock: &FastClockLockParameters);
    /// Set DFLLCTRL MODE, WAITLOCK and QLDIS, keeping the other bits.
    fn configure_dfll_closed_loop(&self);
    /// Set DFLLCTRL ENABLE, keeping the other bits.
    fn enable_dfll(&self);
    /// Clear DFLLCTRL.
    fn disable_dfll(&self);
    /// Read the DFLL bits of PCLKSR.
    fn dfll_status(&self) -> DfllStatus;
    /// Set SYSCTRL XOSC32K.RUNSTDBY.
    fn keep_xosc32k_in_standby(&self);
}

impl<T: ClockRegisters + ?Sized> ClockRegisters for &T {
    fn select_main_source(&self, source: ClockSource) {
        (**self).select_main_source(source)
    }
    fn reset_main_divider(&self) {
        (**self).reset_main_divider()
    }
    fn attach_dfll_reference(&self) {
        (**self).attach_dfll_reference()
    }
    fn attach_rtc_clock(&self) {
        (**self).attach_rtc_clock()
    }
    fn generator_sync_busy(&self) -> bool {
        (**self).generator_sync_busy()
    }
    fn set_wait_states(&self, wait_states: FlashWaitStates) {
        (**self).set_wait_states(wait_states)
    }
    fn enable_dfll_open_loop(&self) {
        (**self).enable_dfll_open_loop()
    }
    fn write_dfll_multiplier(&self, lock: &FastClockLockParameters) {
        (**self).write_dfll_multiplier(lock)
    }
    fn configure_dfll_closed_loop(&self) {
        (**self).configure_dfll_closed_loop()
    }
    fn enable_dfll(&self) {
        (**self).enable_dfll()
    }
    fn disable_dfll(&self) {
        (**self).disable_dfll()
    }
    fn dfll_status(&self) -> DfllStatus {
        (**self).dfll_status()
    }
    fn keep_xosc32k_in_standby(&self) {
        (**self).keep_xosc32k_in_standby()
    }
}

/// The three peripherals involved in clock switching.
pub struct ClockPeripherals {
    gclk: GCLK,
    sysctrl: SYSCTRL,
    nvmctrl: NVMCTRL,
}

impl ClockPeripherals {
    /// Releases the underlying devices.
    pub fn free(self) -> (GCLK, SYSCTRL, NVMCTRL) {
        (self.gclk, self.sysctrl, self.nvmctrl)
    }
}

impl ClockRegisters for ClockPeripherals {
    fn select_main_source(&self, source: ClockSource) {
        self.gclk.genctrl.write(|w| {
            unsafe { w.id().bits(0) };
            match source {
                ClockSource::FastSynthesized => w.src().dfll48m(),
                ClockSource::MediumOscillator => w.src().osc8m(),
                ClockSource::SlowCrystal => w.src().xosc32k(),
            };
            w.idc().set_bit().genen().set_bit()
        });
    }

    fn reset_main_divider(&self) {
        self.gclk.gendiv.write(|w| unsafe { w.id().bits(0).div().bits(0) });
    }

    fn attach_dfll_reference(&self) {
        self.gclk
            .clkctrl
            .write(|w| w.id().dfll48().gen().gclk1().clken().set_bit());
    }

    fn attach_rtc_clock(&self) {
        self.gclk
            .clkctrl
            .write(|w| w.id().rtc().gen().gclk1().clken().set_bit());
    }

    fn generator_sync_busy(&self) -> bool {
        self.gclk.status.read().syncbusy().bit_is_set()
    }

    fn set_wait_states(&self, wait_states: FlashWaitStates) {
        self.nvmctrl.ctrlb.modify(|_, w| match wait_states {
            FlashWaitStates::Zero => w.rws().single(),
            FlashWaitStates::One => w.rws().half(),
        });
    }

    fn enable_dfll_open_loop(&self) {
        // Without ONDEMAND, see errata 9905.
        self.sysctrl.dfllctrl.write(|w| unsafe { w.bits(0) }.enable().set_bit());
    }

    fn write_dfll_multiplier(&self, lock: &FastClockLockParameters) {
        self.sysctrl.dfllmul.write(|w| unsafe {
            w.mul()
                .bits(lock.multiplier)
                .fstep()
                .bits(lock.fine_step)
                .cstep()
                .bits(lock.coarse_step)
        });
    }

    fn configure_dfll_closed_loop(&self) {
        self.sysctrl.dfllctrl.modify(|_, w| {
            w.mode().set_bit().waitlock().set_bit().qldis().set_bit()
        });
    }

    fn enable_dfll(&self) {
        self.sysctrl.dfllctrl.modify(|_, w| w.enable().set_bit());
    }

    fn disable_dfll(&self) {
        self.sysctrl.dfllctrl.write(|w| unsafe { w.bits(0) });
    }

    fn dfll_status(&self) -> DfllStatus {
        let pclksr = self.sysctrl.pclksr.read();
        DfllStatus {
            ready: pclksr.dfllrdy().bit_is_set(),
            coarse_locked: pclksr.dflllckc().bit_is_set(),
            fine_locked: pclksr.dflllckf().bit_is_set(),
        }
    }

    fn keep_xosc32k_in_standby(&self) {
        self.sysctrl.xosc32k.modify(|_, w| w.runstdby().set_bit());
    }
}

/// Proof that the RTC is clocked from the 32.768 kHz crystal through
/// generic clock generator 1, and that the crystal keeps running in standby.
#[derive(Debug)]
pub struct RtcClock {
    frequency: HertzU32,
}

impl RtcClock {
    /// Frequency of GCLK_RTC.
    pub fn freq(&self) -> HertzU32 {
        self.frequency
    }
}

/// Owns the clock generator configuration of the CPU.
///
/// The controller never remembers which source is selected: the GCLK
/// registers are the only record of it.
pub struct ClockController<C: ClockRegisters> {
    regs: C,
    policy: WaitPolicy,
}

impl ClockController<ClockPeripherals> {
    /// Takes ownership of the clock related peripherals.
    pub fn new(gclk: GCLK, sysctrl: SYSCTRL, nvmctrl: NVMCTRL) -> Self {
        Self::with_registers(ClockPeripherals {
            gclk,
            sysctrl,
            nvmctrl,
        })
    }
}

impl<C: ClockRegisters> ClockController<C> {
    /// Drive any implementation of [`ClockRegisters`].
    pub fn with_registers(regs: C) -> Self {
        ClockController {
            regs,
            policy: WaitPolicy::Unbounded,
        }
    }

    /// Bound every status wait of the DFLL switch-over.
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Releases the underlying registers.
    pub fn free(self) -> C {
        self.regs
    }

    /// Run the CPU from `source`.
    ///
    /// Only the switch to [`ClockSource::FastSynthesized`] waits on hardware,
    /// so only that direction can return an error, and only with a bounded
    /// wait policy.
    pub fn set_cpu_clock(&mut self, source: ClockSource) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("switching CPU clock to {}", source);

        match source {
            ClockSource::FastSynthesized => self.switch_to_dfll(),
            ClockSource::MediumOscillator | ClockSource::SlowCrystal => {
                self.switch_to_low_power(source);
                Ok(())
            }
        }
    }

    /// Route the 32.768 kHz crystal to the RTC.
    ///
    /// Generic clock generator 1 is left running from XOSC32K by the boot
    /// code; this only keeps the crystal alive in standby and attaches
    /// GCLK_RTC to generator 1.
    pub fn rtc_clock(&mut self) -> RtcClock {
        self.regs.keep_xosc32k_in_standby();
        self.regs.attach_rtc_clock();

        RtcClock {
            frequency: ClockSource::SlowCrystal.frequency(),
        }
    }

    /// Whether the DFLL accepts a new register write.
    pub fn dfll_ready(&self) -> nb::Result<(), Infallible> {
        if !self.regs.dfll_status().ready {
            return Err(WouldBlock);
        }
        Ok(())
    }

    /// Whether the DFLL holds both its coarse and its fine lock.
    pub fn dfll_locked(&self) -> nb::Result<(), Infallible> {
        let status = self.regs.dfll_status();
        if !(status.coarse_locked && status.fine_locked) {
            return Err(WouldBlock);
        }
        Ok(())
    }

    /// Whether the generic clock controller has finished synchronizing.
    pub fn generators_synced(&self) -> nb::Result<(), Infallible> {
        if self.regs.generator_sync_busy() {
            return Err(WouldBlock);
        }
        Ok(())
    }

    fn switch_to_low_power(&mut self, source: ClockSource) {
        self.regs.select_main_source(source);
        self.regs.set_wait_states(source.wait_states());
        // nothing else runs from the DFLL
        self.regs.disable_dfll();
    }

    fn switch_to_dfll(&mut self) -> Result<(), Error> {
        let lock = FastClockLockParameters::ARDUINO_DEFAULT;

        // Must be in place before the frequency goes up.
        self.regs
            .set_wait_states(ClockSource::FastSynthesized.wait_states());

        self.regs.attach_dfll_reference();
        self.await_stage(LockStage::ReferenceAttach, Self::generators_synced)?;

        self.regs.enable_dfll_open_loop();
        self.await_stage(LockStage::OpenLoopReady, Self::dfll_ready)?;

        self.regs.write_dfll_multiplier(&lock);
        self.await_stage(LockStage::MultiplierReady, Self::dfll_ready)?;

        self.regs.configure_dfll_closed_loop();
        self.await_stage(LockStage::ClosedLoopReady, Self::dfll_ready)?;

        self.regs.enable_dfll();
        self.await_stage(LockStage::Locked, Self::dfll_locked)?;
        self.await_stage(LockStage::Locked, Self::dfll_ready)?;

        self.regs.reset_main_divider();
        self.await_stage(LockStage::GeneratorSwitch, Self::generators_synced)?;

        self.regs.select_main_source(ClockSource::FastSynthesized);
        self.await_stage(LockStage::GeneratorSwitch, Self::generators_synced)
    }

    fn await_stage(
        &self,
        stage: LockStage,
        poll: fn(&Self) -> nb::Result<(), Infallible>,
    ) -> Result<(), Error> {
        await_condition(self.policy, || poll(self).is_ok()).map_err(|_| {
            #[cfg(feature = "defmt")]
            defmt::warn!("DFLL48M switch timed out at {}", stage);

            Error::ClockLockTimeout(stage)
        })
    }
}
