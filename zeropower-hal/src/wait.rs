//! Busy-wait on hardware status bits
//!
//! Every status wait in this crate goes through [`await_condition`]. The
//! default [`WaitPolicy::Unbounded`] spins until the condition holds, which
//! is what the hardware contract promises under correct wiring: a missing
//! or miswired oscillator hangs the caller. A bounded policy turns that hang
//! into a [`Timeout`] that the calling driver maps onto its own error type.

/// How long a status wait may spin.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitPolicy {
    /// Spin until the condition holds, however long that takes.
    #[default]
    Unbounded,
    /// Give up after this many unsuccessful polls.
    Spins(u32),
}

/// A bounded wait ran out of polls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout;

/// Poll `predicate` until it returns `true`.
///
/// The predicate is always evaluated at least once, so a condition which
/// already holds succeeds even with `WaitPolicy::Spins(0)`.
pub fn await_condition<F>(policy: WaitPolicy, mut predicate: F) -> Result<(), Timeout>
where
    F: FnMut() -> bool,
{
    match policy {
        WaitPolicy::Unbounded => {
            while !predicate() {
                core::hint::spin_loop();
            }
            Ok(())
        }
        WaitPolicy::Spins(limit) => {
            let mut spins = 0;
            while !predicate() {
                if spins == limit {
                    return Err(Timeout);
                }
                spins += 1;
                core::hint::spin_loop();
            }
            Ok(())
        }
    }
}
