//! Register simulators for the host unit tests

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::boxed::Box;
use std::vec::Vec;

use crate::clocks::{
    ClockRegisters, ClockSource, DfllStatus, FastClockLockParameters, FlashWaitStates,
};
use crate::cpu::Cpu;
use crate::pac::Interrupt;
use crate::ports::{PinDescriptor, PortRegisters, UsbRegisters};
use crate::rtc::RtcRegisters;
use crate::schedule::{handle_interrupt, Callback, SharedSchedule};

/// INTFLAG.CMP0
pub const CMP0: u8 = 1 << 0;
/// INTFLAG.SYNCRDY
pub const SYNCRDY: u8 = 1 << 6;
/// INTFLAG.OVF
pub const OVF: u8 = 1 << 7;

const ALL_FLAGS: u8 = CMP0 | SYNCRDY | OVF;

/// A register write seen by [`SimClocks`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClockWrite {
    MainSource(ClockSource),
    MainDivider,
    DfllReference,
    RtcClock,
    WaitStates(FlashWaitStates),
    DfllOpenLoop,
    DfllMultiplier(FastClockLockParameters),
    DfllClosedLoop,
    DfllEnable,
    DfllDisable,
    Xosc32kRunStandby,
}

/// GCLK, SYSCTRL and NVMCTRL with a DFLL that locks as soon as it is set up
/// in closed loop mode, provided its reference clock is present.
pub struct SimClocks {
    reference: bool,
    main_source: Cell<Option<ClockSource>>,
    wait_states: Cell<FlashWaitStates>,
    dfll_enabled: Cell<bool>,
    dfll_closed_loop: Cell<bool>,
    dfll_multiplier: Cell<Option<FastClockLockParameters>>,
    xosc32k_runstdby: Cell<bool>,
    writes: RefCell<Vec<(ClockWrite, bool)>>,
}

impl SimClocks {
    pub fn new() -> Self {
        SimClocks {
            reference: true,
            main_source: Cell::new(None),
            wait_states: Cell::new(FlashWaitStates::Zero),
            dfll_enabled: Cell::new(false),
            dfll_closed_loop: Cell::new(false),
            dfll_multiplier: Cell::new(None),
            xosc32k_runstdby: Cell::new(false),
            writes: RefCell::new(Vec::new()),
        }
    }

    /// XOSC32K is dead, so the DFLL never locks.
    pub fn without_reference() -> Self {
        SimClocks {
            reference: false,
            ..Self::new()
        }
    }

    /// Source of generator 0, `None` until one is selected.
    pub fn main_source(&self) -> Option<ClockSource> {
        self.main_source.get()
    }

    pub fn wait_states(&self) -> FlashWaitStates {
        self.wait_states.get()
    }

    pub fn dfll_enabled(&self) -> bool {
        self.dfll_enabled.get()
    }

    pub fn dfll_closed_loop(&self) -> bool {
        self.dfll_closed_loop.get()
    }

    pub fn dfll_multiplier(&self) -> Option<FastClockLockParameters> {
        self.dfll_multiplier.get()
    }

    pub fn xosc32k_runs_in_standby(&self) -> bool {
        self.xosc32k_runstdby.get()
    }

    pub fn writes(&self) -> Vec<ClockWrite> {
        self.writes.borrow().iter().map(|(write, _)| *write).collect()
    }

    /// Every write, with whether the DFLL reported lock when it happened.
    pub fn writes_with_lock_state(&self) -> Vec<(ClockWrite, bool)> {
        self.writes.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    fn locked(&self) -> bool {
        self.reference
            && self.dfll_enabled.get()
            && self.dfll_closed_loop.get()
            && self.dfll_multiplier.get().is_some()
    }

    fn record(&self, write: ClockWrite) {
        let locked = self.locked();
        self.writes.borrow_mut().push((write, locked));
    }
}

impl ClockRegisters for SimClocks {
    fn select_main_source(&self, source: ClockSource) {
        self.record(ClockWrite::MainSource(source));
        self.main_source.set(Some(source));
    }

    fn reset_main_divider(&self) {
        self.record(ClockWrite::MainDivider);
    }

    fn attach_dfll_reference(&self) {
        self.record(ClockWrite::DfllReference);
    }

    fn attach_rtc_clock(&self) {
        self.record(ClockWrite::RtcClock);
    }

    fn generator_sync_busy(&self) -> bool {
        false
    }

    fn set_wait_states(&self, wait_states: FlashWaitStates) {
        self.record(ClockWrite::WaitStates(wait_states));
        self.wait_states.set(wait_states);
    }

    fn enable_dfll_open_loop(&self) {
        self.record(ClockWrite::DfllOpenLoop);
        self.dfll_enabled.set(true);
        self.dfll_closed_loop.set(false);
    }

    fn write_dfll_multiplier(&self, lock: &FastClockLockParameters) {
        self.record(ClockWrite::DfllMultiplier(*lock));
        self.dfll_multiplier.set(Some(*lock));
    }

    fn configure_dfll_closed_loop(&self) {
        self.record(ClockWrite::DfllClosedLoop);
        self.dfll_closed_loop.set(true);
    }

    fn enable_dfll(&self) {
        self.record(ClockWrite::DfllEnable);
        self.dfll_enabled.set(true);
    }

    fn disable_dfll(&self) {
        self.record(ClockWrite::DfllDisable);
        self.dfll_enabled.set(false);
        self.dfll_closed_loop.set(false);
    }

    fn dfll_status(&self) -> DfllStatus {
        let locked = self.locked();
        DfllStatus {
            ready: true,
            coarse_locked: locked,
            fine_locked: locked,
        }
    }

    fn keep_xosc32k_in_standby(&self) {
        self.record(ClockWrite::Xosc32kRunStandby);
        self.xosc32k_runstdby.set(true);
    }
}

/// The RTC in mode 0. COUNT only moves when it is read, by a configurable
/// step, which keeps delays deterministic.
pub struct SimRtc {
    stuck_in_reset: bool,
    step: AtomicU32,
    in_reset: AtomicBool,
    running: AtomicBool,
    continuous_read: AtomicBool,
    count: AtomicU32,
    compare: AtomicU32,
    intflag: AtomicU8,
    compare_interrupt: AtomicBool,
    reads: AtomicU32,
    resets: AtomicU32,
}

impl SimRtc {
    pub fn new() -> Self {
        SimRtc {
            stuck_in_reset: false,
            step: AtomicU32::new(0),
            in_reset: AtomicBool::new(false),
            running: AtomicBool::new(false),
            continuous_read: AtomicBool::new(false),
            count: AtomicU32::new(0),
            compare: AtomicU32::new(0),
            intflag: AtomicU8::new(0),
            compare_interrupt: AtomicBool::new(false),
            reads: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        }
    }

    /// CTRL.SWRST never clears.
    pub fn stuck_in_reset() -> Self {
        SimRtc {
            stuck_in_reset: true,
            ..Self::new()
        }
    }

    /// Advance COUNT by `step` on every read.
    pub fn set_step(&self, step: u32) {
        self.step.store(step, Ordering::SeqCst);
    }

    pub fn set_count(&self, count: u32) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Set interrupt flags, as the hardware does.
    pub fn raise(&self, flags: u8) {
        self.intflag.fetch_or(flags, Ordering::SeqCst);
    }

    pub fn intflag(&self) -> u8 {
        self.intflag.load(Ordering::SeqCst)
    }

    /// Whether the counter has been started since the last reset.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn continuous_read(&self) -> bool {
        self.continuous_read.load(Ordering::SeqCst)
    }

    /// Number of COUNT reads so far.
    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of software resets so far.
    pub fn resets(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }
}

impl RtcRegisters for SimRtc {
    fn software_reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.continuous_read.store(false, Ordering::SeqCst);
        self.count.store(0, Ordering::SeqCst);
        self.compare.store(0, Ordering::SeqCst);
        self.intflag.store(0, Ordering::SeqCst);
        self.compare_interrupt.store(false, Ordering::SeqCst);
        self.in_reset.store(self.stuck_in_reset, Ordering::SeqCst);
    }

    fn reset_in_progress(&self) -> bool {
        self.in_reset.load(Ordering::SeqCst)
    }

    fn start_counter(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn sync_busy(&self) -> bool {
        false
    }

    fn enable_continuous_read(&self) {
        self.continuous_read.store(true, Ordering::SeqCst);
    }

    fn count(&self) -> u32 {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self.step.load(Ordering::SeqCst);
        self.count.fetch_add(step, Ordering::SeqCst)
    }

    fn write_count(&self, value: u32) {
        self.count.store(value, Ordering::SeqCst);
    }

    fn compare(&self) -> u32 {
        self.compare.load(Ordering::SeqCst)
    }

    fn write_compare(&self, value: u32) {
        self.compare.store(value, Ordering::SeqCst);
    }

    fn clear_interrupt_flags(&self) {
        self.intflag.fetch_and(!ALL_FLAGS, Ordering::SeqCst);
    }

    fn compare_interrupt_enabled(&self) -> bool {
        self.compare_interrupt.load(Ordering::SeqCst)
    }

    fn enable_compare_interrupt(&self) {
        self.compare_interrupt.store(true, Ordering::SeqCst);
    }

    fn disable_interrupts(&self) {
        self.compare_interrupt.store(false, Ordering::SeqCst);
    }
}

/// Run the counter up to the compare value.
///
/// Returns whether the compare interrupt was enabled, in which case the
/// handler has run.
pub fn drive_compare(sim: &SimRtc, schedule: &SharedSchedule) -> bool {
    sim.set_count(sim.compare());
    sim.raise(CMP0);
    if !sim.compare_interrupt_enabled() {
        return false;
    }
    handle_interrupt(sim, schedule);
    true
}

/// A callback which counts its invocations.
pub fn counting_callback() -> (&'static AtomicU32, Callback) {
    let fired: &'static AtomicU32 = Box::leak(Box::new(AtomicU32::new(0)));
    let callback: Callback = Box::leak(Box::new(move || {
        fired.fetch_add(1, Ordering::SeqCst);
    }));
    (fired, callback)
}

/// A core whose wait for interrupt runs the RTC up to its next compare
/// match, when one is attached.
pub struct SimCpu<'a> {
    rtc: Option<(&'a SimRtc, &'a SharedSchedule)>,
    enabled: Vec<(Interrupt, u8)>,
    sleep_deep: bool,
    wakeups: u32,
}

impl SimCpu<'static> {
    pub fn new() -> Self {
        SimCpu {
            rtc: None,
            enabled: Vec::new(),
            sleep_deep: false,
            wakeups: 0,
        }
    }
}

impl<'a> SimCpu<'a> {
    pub fn with_rtc(sim: &'a SimRtc, schedule: &'a SharedSchedule) -> Self {
        SimCpu {
            rtc: Some((sim, schedule)),
            enabled: Vec::new(),
            sleep_deep: false,
            wakeups: 0,
        }
    }

    pub fn enabled_interrupts(&self) -> &[(Interrupt, u8)] {
        &self.enabled
    }

    pub fn sleep_deep(&self) -> bool {
        self.sleep_deep
    }

    pub fn wakeups(&self) -> u32 {
        self.wakeups
    }
}

impl Cpu for SimCpu<'_> {
    fn enable_interrupt(&mut self, irq: Interrupt, priority: u8) {
        self.enabled.push((irq, priority));
    }

    fn set_sleep_deep(&mut self) {
        self.sleep_deep = true;
    }

    fn wait_for_interrupt(&mut self) {
        self.wakeups += 1;
        if let Some((sim, schedule)) = self.rtc {
            drive_compare(sim, schedule);
        }
    }
}

/// PORT with every reset pin recorded.
pub struct SimPort {
    pub writes: RefCell<Vec<PinDescriptor>>,
}

impl SimPort {
    pub fn new() -> Self {
        SimPort {
            writes: RefCell::new(Vec::new()),
        }
    }
}

impl PortRegisters for SimPort {
    fn reset_pin_config(&self, pin: PinDescriptor) {
        self.writes.borrow_mut().push(pin);
    }
}

/// USB counting CTRLA resets.
pub struct SimUsb {
    pub resets: Cell<u32>,
}

impl SimUsb {
    pub fn new() -> Self {
        SimUsb {
            resets: Cell::new(0),
        }
    }
}

impl UsbRegisters for SimUsb {
    fn reset_control(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}
