// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Access to the clock controller register window.
//!
//! Clock drivers never touch memory directly. They go through a
//! [`RegisterPort`], which on hardware is an [`MmioWindow`] over the clock
//! controller's register block and in tests is a fake register file.
//! [`Regmap`] bundles a port with the [`Delay`] used for polling, since every
//! driver needs both.

use core::ptr::NonNull;

use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

use crate::errorcode::{BusError, ClockError};
use crate::poll::{poll_until, Delay, PollStatus};

/// Synchronous 32-bit access to a bounded register window.
///
/// Offsets are byte offsets from the start of the window. Implementations
/// are responsible for serializing concurrent bus access.
pub trait RegisterPort {
    fn read32(&self, offset: u32) -> Result<u32, BusError>;

    fn write32(&self, offset: u32, value: u32) -> Result<(), BusError>;

    /// Replace the bits selected by `mask` with those of `value`.
    ///
    /// The write is skipped when the register already holds the result.
    fn update_bits32(&self, offset: u32, mask: u32, value: u32) -> Result<(), BusError> {
        let orig = self.read32(offset)?;
        let new = (orig & !mask) | (value & mask);
        if new != orig {
            self.write32(offset, new)?;
        }
        Ok(())
    }
}

/// A memory-mapped register window.
pub struct MmioWindow {
    base: NonNull<u32>,
    len: u32,
}

impl MmioWindow {
    /// Create a window of `len` bytes starting at `base`.
    ///
    /// ## Safety
    ///
    /// `base` must point to device memory that is valid for volatile 32-bit
    /// reads and writes over the whole `len` bytes for as long as the window
    /// exists, and no other code may treat that memory as ordinary RAM.
    pub const unsafe fn new(base: NonNull<u32>, len: u32) -> Self {
        Self { base, len }
    }

    fn word(&self, offset: u32) -> Result<*mut u32, BusError> {
        if offset % 4 != 0 {
            return Err(BusError::Unaligned { offset });
        }
        if offset.checked_add(4).map_or(true, |end| end > self.len) {
            return Err(BusError::OutOfRange { offset });
        }
        Ok(self.base.as_ptr().wrapping_add((offset / 4) as usize))
    }
}

impl RegisterPort for MmioWindow {
    fn read32(&self, offset: u32) -> Result<u32, BusError> {
        let ptr = self.word(offset)?;
        // Safety: `word` checked the offset against the window that the
        // creator of this `MmioWindow` promised is valid device memory.
        Ok(unsafe { core::ptr::read_volatile(ptr) })
    }

    fn write32(&self, offset: u32, value: u32) -> Result<(), BusError> {
        let ptr = self.word(offset)?;
        // Safety: see `read32`.
        unsafe { core::ptr::write_volatile(ptr, value) };
        Ok(())
    }
}

/// Raw register bits selected by `value`, for use as an update mask.
pub(crate) fn bits<R: RegisterLongName>(value: FieldValue<u32, R>) -> u32 {
    let mut reg = LocalRegisterCopy::<u32, R>::new(0);
    reg.modify(value);
    reg.get()
}

/// A register port together with the delay source used to poll it.
#[derive(Clone, Copy)]
pub struct Regmap<'a> {
    port: &'a dyn RegisterPort,
    delay: &'a dyn Delay,
}

impl<'a> Regmap<'a> {
    pub const fn new(port: &'a dyn RegisterPort, delay: &'a dyn Delay) -> Self {
        Self { port, delay }
    }

    #[inline]
    pub fn read(&self, offset: u32) -> Result<u32, ClockError> {
        Ok(self.port.read32(offset)?)
    }

    #[inline]
    pub fn write(&self, offset: u32, value: u32) -> Result<(), ClockError> {
        Ok(self.port.write32(offset, value)?)
    }

    #[inline]
    pub fn update_bits(&self, offset: u32, mask: u32, value: u32) -> Result<(), ClockError> {
        Ok(self.port.update_bits32(offset, mask, value)?)
    }

    pub fn delay_us(&self, us: u32) {
        self.delay.delay_us(us)
    }

    /// Sample `offset` until `done` accepts its value.
    ///
    /// The register is read at most `iterations` times with `interval_us`
    /// between samples. Bus errors end the poll immediately.
    pub fn poll_register<F>(
        &self,
        offset: u32,
        iterations: u32,
        interval_us: u32,
        mut done: F,
    ) -> Result<PollStatus, ClockError>
    where
        F: FnMut(u32) -> bool,
    {
        poll_until(self.delay, iterations, interval_us, || {
            self.read(offset).map(&mut done)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{bits, MmioWindow, RegisterPort};
    use crate::errorcode::BusError;
    use core::ptr::NonNull;
    use tock_registers::register_bitfields;

    register_bitfields![u32,
        SAMPLE [
            LOW OFFSET(0) NUMBITS(4) [],
            HIGH OFFSET(28) NUMBITS(1) []
        ]
    ];

    #[test]
    fn mmio_window_bounds() {
        let mut backing = [0u32; 4];
        let window = unsafe { MmioWindow::new(NonNull::new(backing.as_mut_ptr()).unwrap(), 16) };

        assert_eq!(Ok(()), window.write32(0xc, 0xdead_beef));
        assert_eq!(Ok(0xdead_beef), window.read32(0xc));
        assert_eq!(Err(BusError::OutOfRange { offset: 0x10 }), window.read32(0x10));
        assert_eq!(Err(BusError::Unaligned { offset: 0x2 }), window.write32(0x2, 1));
        assert_eq!(
            Err(BusError::OutOfRange { offset: u32::MAX - 3 }),
            window.read32(u32::MAX - 3)
        );
    }

    #[test]
    fn update_bits_preserves_unmasked_bits() {
        let mut backing = [0u32; 2];
        let window = unsafe { MmioWindow::new(NonNull::new(backing.as_mut_ptr()).unwrap(), 8) };

        window.write32(4, 0xf0f0_0000).unwrap();
        window.update_bits32(4, 0xff, 0x1234).unwrap();
        assert_eq!(Ok(0xf0f0_0034), window.read32(4));
    }

    #[test]
    fn field_masks() {
        assert_eq!(0xf, bits(SAMPLE::LOW::SET));
        assert_eq!(0x5, bits(SAMPLE::LOW.val(5)));
        assert_eq!(0x1000_000f, bits(SAMPLE::LOW::SET + SAMPLE::HIGH::SET));
    }
}
