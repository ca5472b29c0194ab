//! Real-Time Counter (RTC)
//!
//! The RTC runs in 32-bit counter mode (mode 0) from the 32.768 kHz crystal
//! through a divide-by-32 prescaler. The count register therefore holds
//! seconds in a 22.10 fixed point format: one tick is 1/1024 s, a little
//! under a millisecond, and the counter rolls over after about 48.5 days.
//!
//! Because the counter keeps running while the CPU clock is stopped, it is
//! both the time base through deep sleep and the source of the wakeup.
//!
//! ## Usage
//! ```no_run
//! use zeropower_hal::clocks::ClockController;
//! use zeropower_hal::cpu::CortexM0Plus;
//! use zeropower_hal::pac;
//! use zeropower_hal::rtc::Rtc;
//! use zeropower_hal::sleep::SleepController;
//!
//! fn blink() {}
//!
//! let p = pac::Peripherals::take().unwrap();
//! let core = pac::CorePeripherals::take().unwrap();
//! let mut cpu = CortexM0Plus::new(core.NVIC, core.SCB);
//!
//! let mut clocks = ClockController::new(p.GCLK, p.SYSCTRL, p.NVMCTRL);
//! let mut rtc = Rtc::init(p.RTC, clocks.rtc_clock(), &mut cpu).unwrap();
//! let mut sleeper = SleepController::new(cpu);
//!
//! // wake up twice a second
//! rtc.schedule_every(512, Some(&blink));
//! loop {
//!     sleeper.sleep();
//! }
//! ```
//!
//! ## Hazards
//!
//! - Writing the counter past a pending compare value silently drops that
//!   interrupt. The compare is an equality match, so it will next fire when
//!   the counter comes round again.
//! - [`Rtc::delay`] is a spin loop; for anything but short waits arm an
//!   interrupt and sleep instead.

use crate::clocks::RtcClock;
use crate::cpu::Cpu;
use crate::pac::{Interrupt, RTC};
use crate::schedule::{self, Callback, SharedSchedule, SCHEDULE};
use crate::wait::{await_condition, WaitPolicy};

/// Ticks per second of the counter.
pub const TICK_HZ: u32 = 1024;

/// NVIC priority of the RTC interrupt.
pub const INTERRUPT_PRIORITY: u8 = 0;

/// A point in RTC time.
pub type RtcInstant = fugit::Instant<u32, 1, TICK_HZ>;

/// A span of RTC time.
pub type RtcDuration = fugit::Duration<u32, 1, TICK_HZ>;

/// Errors raised by [`Rtc::init_with`] when a bounded [`WaitPolicy`] is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The software reset bit never cleared.
    ModuleResetTimeout,
    /// The enable write never finished synchronizing to the RTC clock domain.
    SyncTimeout,
}

/// Register level operations on the RTC in mode 0.
pub trait RtcRegisters {
    /// Set CTRL.SWRST.
    fn software_reset(&self);
    /// Whether CTRL.SWRST is still set.
    fn reset_in_progress(&self) -> bool;
    /// Start counting: 32-bit counter mode, divide by 32, enabled.
    fn start_counter(&self);
    /// STATUS.SYNCBUSY.
    fn sync_busy(&self) -> bool;
    /// Keep COUNT synchronized for reading (READREQ RREQ and RCONT).
    fn enable_continuous_read(&self);
    /// Read COUNT.
    fn count(&self) -> u32;
    /// Write COUNT.
    fn write_count(&self, value: u32);
    /// Read COMP0.
    fn compare(&self) -> u32;
    /// Write COMP0.
    fn write_compare(&self, value: u32);
    /// Clear every INTFLAG bit.
    fn clear_interrupt_flags(&self);
    /// Whether the compare 0 interrupt is enabled.
    fn compare_interrupt_enabled(&self) -> bool;
    /// Enable the compare 0 interrupt.
    fn enable_compare_interrupt(&self);
    /// Disable every interrupt source.
    fn disable_interrupts(&self);
}

impl<T: RtcRegisters + ?Sized> RtcRegisters for &T {
    fn software_reset(&self) {
        (**self).software_reset()
    }
    fn reset_in_progress(&self) -> bool {
        (**self).reset_in_progress()
    }
    fn start_counter(&self) {
        (**self).start_counter()
    }
    fn sync_busy(&self) -> bool {
        (**self).sync_busy()
    }
    fn enable_continuous_read(&self) {
        (**self).enable_continuous_read()
    }
    fn count(&self) -> u32 {
        (**self).count()
    }
    fn write_count(&self, value: u32) {
        (**self).write_count(value)
    }
    fn compare(&self) -> u32 {
        (**self).compare()
    }
    fn write_compare(&self, value: u32) {
        (**self).write_compare(value)
    }
    fn clear_interrupt_flags(&self) {
        (**self).clear_interrupt_flags()
    }
    fn compare_interrupt_enabled(&self) -> bool {
        (**self).compare_interrupt_enabled()
    }
    fn enable_compare_interrupt(&self) {
        (**self).enable_compare_interrupt()
    }
    fn disable_interrupts(&self) {
        (**self).disable_interrupts()
    }
}

impl RtcRegisters for RTC {
    fn software_reset(&self) {
        self.mode0().ctrl.write(|w| w.swrst().set_bit());
    }

    fn reset_in_progress(&self) -> bool {
        self.mode0().ctrl.read().swrst().bit_is_set()
    }

    fn start_counter(&self) {
        // no clear on match
        self.mode0()
            .ctrl
            .write(|w| w.mode().count32().prescaler().div32().enable().set_bit());
    }

    fn sync_busy(&self) -> bool {
        self.mode0().status.read().syncbusy().bit_is_set()
    }

    fn enable_continuous_read(&self) {
        // ADDR resets to COUNT
        self.mode0()
            .readreq
            .write(|w| w.rreq().set_bit().rcont().set_bit());
    }

    fn count(&self) -> u32 {
        self.mode0().count.read().bits()
    }

    fn write_count(&self, value: u32) {
        self.mode0().count.write(|w| unsafe { w.bits(value) });
    }

    fn compare(&self) -> u32 {
        self.mode0().comp[0].read().bits()
    }

    fn write_compare(&self, value: u32) {
        self.mode0().comp[0].write(|w| unsafe { w.bits(value) });
    }

    fn clear_interrupt_flags(&self) {
        self.mode0()
            .intflag
            .write(|w| w.cmp0().set_bit().syncrdy().set_bit().ovf().set_bit());
    }

    fn compare_interrupt_enabled(&self) -> bool {
        self.mode0().intenset.read().cmp0().bit_is_set()
    }

    fn enable_compare_interrupt(&self) {
        self.mode0().intenset.write(|w| w.cmp0().set_bit());
    }

    fn disable_interrupts(&self) {
        self.mode0()
            .intenclr
            .write(|w| w.cmp0().set_bit().syncrdy().set_bit().ovf().set_bit());
    }
}

/// The RTC, configured as a free-running 1024 Hz counter.
pub struct Rtc<'s, R: RtcRegisters> {
    regs: R,
    schedule: &'s SharedSchedule,
}

impl Rtc<'static, RTC> {
    /// Reset and start the RTC, serviced by [`schedule::on_interrupt`].
    ///
    /// Waits on the hardware without a bound, like every other status wait
    /// in this crate by default.
    pub fn init<C: Cpu>(rtc: RTC, clock: RtcClock, cpu: &mut C) -> Result<Self, Error> {
        Self::init_with(rtc, &SCHEDULE, clock, cpu, WaitPolicy::Unbounded)
    }
}

impl<'s, R: RtcRegisters> Rtc<'s, R> {
    /// Reset and start the RTC against any register implementation and
    /// shared record.
    ///
    /// The RTC is only reset by a power-on reset, so a warm restart would
    /// otherwise inherit the previous program's configuration. The module is
    /// software reset, started with the divide-by-32 prescaler, set to
    /// continuously synchronize COUNT for reading, its interrupt line is
    /// enabled at the highest priority, and the count is cleared.
    pub fn init_with<C: Cpu>(
        regs: R,
        schedule: &'s SharedSchedule,
        _clock: RtcClock,
        cpu: &mut C,
        policy: WaitPolicy,
    ) -> Result<Self, Error> {
        schedule::disarm(&regs, schedule);

        regs.software_reset();
        await_condition(policy, || !regs.reset_in_progress())
            .map_err(|_| Error::ModuleResetTimeout)?;

        regs.start_counter();
        await_condition(policy, || !regs.sync_busy()).map_err(|_| Error::SyncTimeout)?;

        regs.enable_continuous_read();

        cpu.enable_interrupt(Interrupt::RTC, INTERRUPT_PRIORITY);

        let mut rtc = Rtc { regs, schedule };
        rtc.write_count(0);

        #[cfg(feature = "defmt")]
        defmt::debug!("RTC running at {=u32} Hz", TICK_HZ);

        Ok(rtc)
    }

    /// Releases the underlying registers.
    ///
    /// The counter keeps running and any armed schedule stays armed.
    pub fn free(self) -> R {
        self.regs
    }

    /// The current count.
    pub fn read_count(&self) -> u32 {
        self.regs.count()
    }

    /// Overwrite the count.
    ///
    /// Setting the count past the compare value of an armed schedule makes
    /// it miss that firing.
    pub fn write_count(&mut self, count: u32) {
        self.regs.write_count(count);
    }

    /// The current count as an instant.
    pub fn now(&self) -> RtcInstant {
        RtcInstant::from_ticks(self.read_count())
    }

    /// Spin until `ticks` ticks have passed.
    ///
    /// The elapsed time is measured with wrapping arithmetic, so a delay
    /// straddling the counter roll-over still ends on time.
    pub fn delay(&self, ticks: u32) {
        let start = self.read_count();
        while self.read_count().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }

    /// Spin for `duration`.
    pub fn delay_for(&self, duration: RtcDuration) {
        self.delay(duration.ticks());
    }

    /// Fire every `interval` ticks, starting `interval` ticks from now.
    ///
    /// Replaces whatever schedule was active.
    ///
    /// `interval` must not be 0. Release builds then arm a one-shot at the
    /// current count, which the counter only reaches again after it wraps,
    /// 48.5 days later.
    pub fn schedule_every(&mut self, interval: u32, callback: Option<Callback>) {
        debug_assert!(interval != 0, "a periodic schedule needs a non-zero interval");

        self.disable_interrupt();
        self.schedule.arm(interval, callback);

        self.regs.clear_interrupt_flags();
        let target = self.read_count().wrapping_add(interval);
        self.regs.write_compare(target);
        self.regs.enable_compare_interrupt();

        #[cfg(feature = "defmt")]
        defmt::trace!("RTC periodic every {=u32} ticks from {=u32}", interval, target);
    }

    /// Fire once, when the count reaches `count`.
    ///
    /// Replaces whatever schedule was active. A `count` which has already
    /// gone by fires once the counter wraps round to it.
    pub fn schedule_at(&mut self, count: u32, callback: Option<Callback>) {
        self.disable_interrupt();
        self.schedule.arm(0, callback);

        self.regs.clear_interrupt_flags();
        self.regs.write_compare(count);
        self.regs.enable_compare_interrupt();

        #[cfg(feature = "defmt")]
        defmt::trace!("RTC one-shot at {=u32}", count);
    }

    /// [`Rtc::schedule_every`] with a typed interval.
    pub fn schedule_every_duration(&mut self, interval: RtcDuration, callback: Option<Callback>) {
        self.schedule_every(interval.ticks(), callback);
    }

    /// [`Rtc::schedule_at`] with a typed instant.
    pub fn schedule_at_instant(&mut self, instant: RtcInstant, callback: Option<Callback>) {
        self.schedule_at(instant.ticks(), callback);
    }

    /// Cancel the active schedule, if any, and drop its callback.
    pub fn disable_interrupt(&mut self) {
        schedule::disarm(&self.regs, self.schedule);
    }

    /// Whether the compare interrupt is enabled.
    pub fn is_armed(&self) -> bool {
        self.regs.compare_interrupt_enabled()
    }

    /// The compare value of the active schedule.
    pub fn compare_target(&self) -> u32 {
        self.regs.compare()
    }

    /// Repeat interval of the active schedule, 0 for a one-shot or when idle.
    pub fn interval(&self) -> u32 {
        self.schedule.interval()
    }
}

/// Convert `amount` units of `1 / per_second` s into ticks, rounding up.
fn ticks_rounded_up(amount: u32, per_second: u32) -> u32 {
    let ticks = (u64::from(amount) * u64::from(TICK_HZ)).div_ceil(u64::from(per_second));
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

impl<R: RtcRegisters> embedded_hal::delay::DelayNs for Rtc<'_, R> {
    fn delay_ns(&mut self, ns: u32) {
        self.delay(ticks_rounded_up(ns, 1_000_000_000));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay(ticks_rounded_up(us, 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay(ticks_rounded_up(ms, 1_000));
    }
}

impl<R: RtcRegisters> embedded_hal_0_2::blocking::delay::DelayMs<u32> for Rtc<'_, R> {
    fn delay_ms(&mut self, ms: u32) {
        self.delay(ticks_rounded_up(ms, 1_000));
    }
}
