//! SPI back-ends for SD/SDHC card drivers, written in Embedded Rust.
//!
//! The SD layer talks to the card through the [`SdSpi`] trait. Three back-ends
//! implement it:
//!
//! * [`RegisterSpi`] drives the AVR SPI controller registers directly and
//!   pipelines multi-byte transfers against the `SPIF` flag.
//! * [`LibrarySpi`] delegates to a platform SPI service ([`PlatformSpi`]).
//! * [`SoftwareSpi`] bit-bangs mode 0 on three digital pins.
//!
//! [`SpiDefault`] names the back-end picked at build time by the
//! `SD_SPI_CONFIGURATION` environment variable (0 register, 1 library,
//! 2 software, 3 and above register plus the [`SdSpiBase`] runtime dispatch
//! surface).
//!
//! ## Features
//!
//! * `log` (default): log through the `log` crate.
//! * `defmt-log`: log through `defmt` instead.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

#[cfg_attr(not(target_arch = "avr"), allow(dead_code))]
mod avr;
pub mod bus;
mod config;
mod library;
mod registers;
mod software;

#[cfg(test)]
mod sim;

#[cfg(target_arch = "avr")]
pub use crate::avr::Atmega328p;
pub use crate::config::{
    is_dynamic, Backend, DefaultSdSpiConfig, SdSpiConfig, SD_SPI_CONFIGURATION,
    SOFT_SPI_MISO_PIN, SOFT_SPI_MOSI_PIN, SOFT_SPI_SCK_PIN,
};
pub use crate::library::{BitOrder, HalPlatform, LibrarySpi, PlatformSpi};
pub use crate::registers::{Register, RegisterSpi, SpiRegisters, Spcr, Spsr};
pub use crate::software::{DigitalPins, PinMode, SoftwareSpi};

use core::num::NonZeroU8;

/// Dummy byte clocked out while receiving.
pub const RECEIVE_TRANSFER_TOKEN: u8 = 0xFF;

/// [`SdSpi`] transfer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Error {
    /// Multi-byte receive failed with a back-end specific code.
    Transfer(NonZeroU8),
}

impl Error {
    /// Convert a numeric status, zero meaning success.
    pub fn check(code: u8) -> Result<(), Error> {
        match NonZeroU8::new(code) {
            None => Ok(()),
            Some(code) => Err(Error::Transfer(code)),
        }
    }

    /// Numeric error code.
    pub fn code(&self) -> u8 {
        match self {
            Error::Transfer(code) => code.get(),
        }
    }
}

/// SPI back-end used by an SD card driver.
///
/// All operations are blocking. The bus is not reentrant: one caller at a
/// time, and chip select stays with the caller.
pub trait SdSpi {
    /// Configure the SD chip select as a high output and MOSI/SCK as outputs.
    ///
    /// Idempotent, performs no transfer.
    fn begin(&mut self);

    /// Set mode 0, MSB first, at the fastest SCK not above `CPU / divisor`.
    fn init(&mut self, divisor: u8);

    /// Receive a byte by clocking out [`RECEIVE_TRANSFER_TOKEN`].
    fn receive(&mut self) -> u8;

    /// Fill `buf` with received bytes.
    fn receive_slice(&mut self, buf: &mut [u8]) -> Result<(), Error>;

    /// Send a byte, discarding the byte shifted in.
    fn send(&mut self, data: u8);

    /// Send all bytes of `buf` in order.
    fn send_slice(&mut self, buf: &[u8]);

    /// Whether callers must bracket use with shared-bus transactions.
    fn uses_transactions(&self) -> bool;
}

impl<T: SdSpi + ?Sized> SdSpi for &mut T {
    #[inline]
    fn begin(&mut self) {
        (**self).begin()
    }

    #[inline]
    fn init(&mut self, divisor: u8) {
        (**self).init(divisor)
    }

    #[inline]
    fn receive(&mut self) -> u8 {
        (**self).receive()
    }

    #[inline]
    fn receive_slice(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        (**self).receive_slice(buf)
    }

    #[inline]
    fn send(&mut self, data: u8) {
        (**self).send(data)
    }

    #[inline]
    fn send_slice(&mut self, buf: &[u8]) {
        (**self).send_slice(buf)
    }

    #[inline]
    fn uses_transactions(&self) -> bool {
        (**self).uses_transactions()
    }
}

/// Runtime dispatch surface, compiled in for selector values of 3 and above.
#[cfg(sd_spi_dynamic)]
pub type SdSpiBase = dyn SdSpi;

/// Default is custom fast SPI.
#[cfg(all(target_arch = "avr", sd_spi_backend = "register"))]
pub type SpiDefault = RegisterSpi<Atmega328p>;

/// Default is the platform SPI library.
#[cfg(sd_spi_backend = "library")]
pub type SpiDefault<P> = LibrarySpi<P>;

/// Default is software SPI.
#[cfg(all(target_arch = "avr", sd_spi_backend = "software"))]
pub type SpiDefault =
    SoftwareSpi<Atmega328p, SOFT_SPI_MISO_PIN, SOFT_SPI_MOSI_PIN, SOFT_SPI_SCK_PIN>;
