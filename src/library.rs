use crate::{Error, SdSpi, RECEIVE_TRANSFER_TOKEN};

use core::convert::Infallible;
use embedded_hal::{
    blocking::spi::Transfer,
    spi::{Mode, MODE_0},
};

/// Bit order on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit shifted first, as SD cards expect.
    MsbFirst,
    /// Least significant bit shifted first.
    LsbFirst,
}

/// Platform SPI service wrapped by [`LibrarySpi`].
pub trait PlatformSpi {
    /// The service only accepts the power-of-two dividers 2..=128.
    const FIXED_DIVIDERS: bool;

    /// Initialize the SPI pins and controller.
    fn begin(&mut self);

    /// Set bit order.
    fn set_bit_order(&mut self, order: BitOrder);

    /// Set clock polarity and phase.
    fn set_data_mode(&mut self, mode: Mode);

    /// Set SCK divider relative to the CPU clock.
    fn set_clock_divider(&mut self, divider: u8);

    /// Exchange one byte, blocking until it has shifted.
    fn transfer(&mut self, data: u8) -> u8;
}

/// Largest fixed divider.
const MAX_FIXED_DIVIDER: u8 = 128;

/// Smallest fixed divider not below `divisor`.
pub(crate) fn fixed_divider(divisor: u8) -> u8 {
    let mut divider = 2;

    while divider < divisor && divider < MAX_FIXED_DIVIDER {
        divider <<= 1;
    }

    divider
}

/// [`PlatformSpi`] over an `embedded-hal` blocking SPI bus.
///
/// The bus is configured for mode 0, MSB first, when it is built and cannot
/// be reconfigured through `embedded-hal`, other requests are only logged.
/// Clock changes go through `set_divider`, called with power-of-two dividers.
pub struct HalPlatform<S: Transfer<u8, Error = Infallible>> {
    spi: S,
    set_divider: fn(&mut S, u8),
    bit_order: BitOrder,
    mode: Mode,
}

impl<S: Transfer<u8, Error = Infallible>> HalPlatform<S> {
    /// Creates a new [`HalPlatform<S>`].
    pub fn new(spi: S, set_divider: fn(&mut S, u8)) -> Self {
        HalPlatform {
            spi,
            set_divider,
            bit_order: BitOrder::MsbFirst,
            mode: MODE_0,
        }
    }

    /// Release the bus.
    pub fn free(self) -> S {
        self.spi
    }

    /// Bus.
    pub fn spi(&self) -> &S {
        &self.spi
    }

    /// Last requested bit order.
    pub fn bit_order(&self) -> BitOrder {
        self.bit_order
    }

    /// Last requested clock polarity and phase.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl<S: Transfer<u8, Error = Infallible>> PlatformSpi for HalPlatform<S> {
    const FIXED_DIVIDERS: bool = true;

    fn begin(&mut self) {}

    fn set_bit_order(&mut self, order: BitOrder) {
        if order != BitOrder::MsbFirst {
            warn!("Bus is MSB first, ignoring bit order {}", debug2format!(order));
        }
        self.bit_order = order;
    }

    fn set_data_mode(&mut self, mode: Mode) {
        if mode != MODE_0 {
            warn!("Bus is in mode 0, ignoring requested mode");
        }
        self.mode = mode;
    }

    fn set_clock_divider(&mut self, divider: u8) {
        (self.set_divider)(&mut self.spi, divider);
    }

    fn transfer(&mut self, data: u8) -> u8 {
        let mut word = [data];
        match self.spi.transfer(&mut word) {
            Ok(received) => received[0],
            Err(never) => match never {},
        }
    }
}

/// SPI back-end delegating to a platform SPI service.
///
/// `Platform` - platform SPI service.
pub struct LibrarySpi<Platform: PlatformSpi> {
    platform: Platform,
}

impl<Platform: PlatformSpi> LibrarySpi<Platform> {
    /// Creates a new [`LibrarySpi<Platform>`].
    pub fn new(platform: Platform) -> Self {
        LibrarySpi { platform }
    }

    /// Release the platform service.
    pub fn free(self) -> Platform {
        self.platform
    }

    /// Platform service.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    #[cfg(test)]
    pub(crate) fn platform_mut(&mut self) -> &mut Platform {
        &mut self.platform
    }
}

impl<Platform: PlatformSpi> SdSpi for LibrarySpi<Platform> {
    fn begin(&mut self) {
        debug!("Library SPI begin");
        self.platform.begin();
    }

    fn init(&mut self, divisor: u8) {
        self.platform.set_bit_order(BitOrder::MsbFirst);
        self.platform.set_data_mode(MODE_0);

        let divider = if Platform::FIXED_DIVIDERS {
            fixed_divider(divisor)
        } else {
            divisor
        };

        info!("Library SPI init, divisor: {}, divider: {}", divisor, divider);
        self.platform.set_clock_divider(divider);
    }

    fn receive(&mut self) -> u8 {
        self.platform.transfer(RECEIVE_TRANSFER_TOKEN)
    }

    fn receive_slice(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for byte in buf.iter_mut() {
            *byte = self.receive();
        }

        Ok(())
    }

    fn send(&mut self, data: u8) {
        self.platform.transfer(data);
    }

    fn send_slice(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.send(byte);
        }
    }

    fn uses_transactions(&self) -> bool {
        true
    }
}
