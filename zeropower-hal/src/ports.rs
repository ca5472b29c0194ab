//! Port and USB shutdown
//!
//! After reset every pin is an input with its buffer disabled, which is the
//! lowest power state a pin can be in. Boards usually reconfigure pins on
//! start-up; these routines put them back. They are plain register writes
//! and can run at any point, in any order.

use core::ops::RangeInclusive;

use crate::pac::{PORT, USB};

/// Location of a pin in the PORT peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinDescriptor {
    group: u8,
    pin: u8,
}

impl PinDescriptor {
    /// Pin `pin` of port group `group` (0 for PA, 1 for PB).
    ///
    /// # Panics
    ///
    /// If `group` is not 0 or 1, or `pin` is not below 32.
    pub const fn new(group: u8, pin: u8) -> Self {
        assert!(group < 2, "the SAM D21 has port groups A and B only");
        assert!(pin < 32, "a port group has 32 pins");
        PinDescriptor { group, pin }
    }

    /// Port group index.
    pub const fn group(&self) -> u8 {
        self.group
    }

    /// Pin index within the group.
    pub const fn pin(&self) -> u8 {
        self.pin
    }
}

/// PINCFG access.
pub trait PortRegisters {
    /// Write 0 to the PINCFG register of `pin`: input buffer off, no pull,
    /// no peripheral multiplexing.
    fn reset_pin_config(&self, pin: PinDescriptor);
}

impl<T: PortRegisters + ?Sized> PortRegisters for &T {
    fn reset_pin_config(&self, pin: PinDescriptor) {
        (**self).reset_pin_config(pin)
    }
}

/// Distance between port groups in the PORT register block.
const GROUP_STRIDE: usize = 0x80;
/// Offset of PINCFG0 within a port group.
const PINCFG_OFFSET: usize = 0x40;

impl PortRegisters for PORT {
    fn reset_pin_config(&self, pin: PinDescriptor) {
        let offset =
            usize::from(pin.group()) * GROUP_STRIDE + PINCFG_OFFSET + usize::from(pin.pin());
        // Safety: `PinDescriptor` keeps the group below 2 and the pin below
        // 32, so the byte lies inside the PINCFG array of the PORT block, and
        // `self` is the only owner of the peripheral.
        unsafe {
            core::ptr::write_volatile((PORT::ptr() as *mut u8).add(offset), 0);
        }
    }
}

/// USB CTRLA access.
pub trait UsbRegisters {
    /// Write 0 to CTRLA: the module is disabled and stops running in standby.
    fn reset_control(&self);
}

impl<T: UsbRegisters + ?Sized> UsbRegisters for &T {
    fn reset_control(&self) {
        (**self).reset_control()
    }
}

impl UsbRegisters for USB {
    fn reset_control(&self) {
        self.device().ctrla.write(|w| unsafe { w.bits(0) });
    }
}

/// Return every pin in `pins` to its reset configuration.
pub fn disable_pins<P: PortRegisters>(port: &P, pins: &[PinDescriptor]) {
    for &pin in pins {
        port.reset_pin_config(pin);
    }
}

/// Return every pin of the board's digital pin table to its reset
/// configuration.
pub fn disable_digital_pins<P: PortRegisters>(port: &P, digital_pins: &[PinDescriptor]) {
    disable_pins(port, digital_pins);
}

/// Return the SPI pins to their reset configuration.
///
/// `spi` is the range of indices into `digital_pins` from MISO to SCK, as
/// the board numbers them. Indices beyond the table are ignored.
pub fn disable_spi_pins<P: PortRegisters>(
    port: &P,
    digital_pins: &[PinDescriptor],
    spi: RangeInclusive<usize>,
) {
    let end = (*spi.end()).min(digital_pins.len().saturating_sub(1));
    if let Some(pins) = digital_pins.get(*spi.start()..=end) {
        disable_pins(port, pins);
    }
}

/// Turn the USB module off completely.
pub fn disable_usb<U: UsbRegisters>(usb: &U) {
    usb.reset_control();
}
