//! State shared between the foreground and the RTC interrupt
//!
//! The record is small and every field has one writer on each
//! side:
//!
//! - the interval and callback are written by the foreground when it arms a
//!   schedule, always after masking the compare interrupt, and cleared by
//!   whichever side disarms it;
//! - the compare register is re-armed only by the handler;
//! - the possum flag is set only by the foreground and cleared only by the
//!   handler.
//!
//! Nothing here blocks. The callback slot sits behind a
//! [`critical_section::Mutex`], which on a single-core part only masks
//! interrupts for the duration of a copy or a take.
//!
//! Bind the handler from the application's vector table:
//!
//! ```ignore
//! #[interrupt]
//! fn RTC() {
//!     zeropower_hal::schedule::on_interrupt();
//! }
//! ```

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::pac::RTC;
use crate::rtc::RtcRegisters;

/// Code run from the RTC interrupt when the compare value is reached.
///
/// It runs in interrupt context: it must not block, and may itself arm a
/// new schedule.
pub type Callback = &'static (dyn Fn() + Sync);

/// The active schedule and the debug release flag.
pub struct SharedSchedule {
    interval: AtomicU32,
    callback: Mutex<Cell<Option<Callback>>>,
    playing_possum: AtomicBool,
}

/// The record serviced by [`on_interrupt`].
pub static SCHEDULE: SharedSchedule = SharedSchedule::new();

impl SharedSchedule {
    /// An idle record.
    pub const fn new() -> Self {
        SharedSchedule {
            interval: AtomicU32::new(0),
            callback: Mutex::new(Cell::new(None)),
            playing_possum: AtomicBool::new(false),
        }
    }

    /// Repeat interval of the active schedule, 0 for a one-shot or when idle.
    pub fn interval(&self) -> u32 {
        self.interval.load(Ordering::Acquire)
    }

    /// Whether a `play_possum` spin is waiting to be released.
    pub fn playing_possum(&self) -> bool {
        self.playing_possum.load(Ordering::Acquire)
    }

    /// Whether a callback is stored.
    pub fn has_callback(&self) -> bool {
        critical_section::with(|cs| self.callback.borrow(cs).get().is_some())
    }

    pub(crate) fn arm(&self, interval: u32, callback: Option<Callback>) {
        self.interval.store(interval, Ordering::Release);
        critical_section::with(|cs| self.callback.borrow(cs).set(callback));
    }

    fn callback(&self) -> Option<Callback> {
        critical_section::with(|cs| self.callback.borrow(cs).get())
    }

    /// Forget the schedule and hand back its callback.
    fn take(&self) -> Option<Callback> {
        critical_section::with(|cs| {
            self.interval.store(0, Ordering::Release);
            self.callback.borrow(cs).take()
        })
    }

    pub(crate) fn enter_possum(&self) {
        self.playing_possum.store(true, Ordering::Release);
    }

    fn release_possum(&self) {
        self.playing_possum.store(false, Ordering::Release);
    }
}

impl Default for SharedSchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Mask every RTC interrupt source and forget the schedule.
///
/// Returns the callback of the schedule that was active.
pub(crate) fn disarm<R: RtcRegisters + ?Sized>(
    regs: &R,
    schedule: &SharedSchedule,
) -> Option<Callback> {
    regs.disable_interrupts();
    schedule.take()
}

/// The RTC interrupt sequence, against any RTC register implementation.
///
/// The callback runs after the compare register has been re-armed (or the
/// interrupt disarmed) so that a callback which schedules something new is
/// not undone by the bookkeeping. A one-shot callback is moved out of the
/// record before it runs, so it is called at most once.
pub fn handle_interrupt<R: RtcRegisters + ?Sized>(regs: &R, schedule: &SharedSchedule) {
    regs.clear_interrupt_flags();

    let interval = schedule.interval();
    let callback = if interval != 0 {
        // From the previous target, not the current count: handler latency
        // must not accumulate.
        regs.write_compare(regs.compare().wrapping_add(interval));
        schedule.callback()
    } else {
        disarm(regs, schedule)
    };

    if let Some(callback) = callback {
        callback();
    }

    schedule.release_possum();
}

/// Body of the `RTC` interrupt handler.
pub fn on_interrupt() {
    // Safety: the handler only touches INTFLAG, COMP0 and INTENCLR, and the
    // foreground masks the interrupt before it writes any of them.
    let rtc = unsafe { RTC::steal() };
    handle_interrupt(&rtc, &SCHEDULE);
}
