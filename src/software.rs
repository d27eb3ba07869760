use crate::{Error, SdSpi, RECEIVE_TRANSFER_TOKEN};

/// Digital pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum PinMode {
    /// Floating input.
    Input,
    /// Input with the pull-up enabled.
    InputPullup,
    /// Push-pull output.
    Output,
}

/// Digital pins addressed by number.
pub trait DigitalPins {
    /// Number of digital pins, valid identifiers are `0..PIN_COUNT`.
    const PIN_COUNT: u8;

    /// Set pin direction.
    fn pin_mode(&mut self, pin: u8, mode: PinMode);

    /// Drive an output pin.
    fn digital_write(&mut self, pin: u8, high: bool);

    /// Sample an input pin.
    fn digital_read(&mut self, pin: u8) -> bool;
}

/// Bit-banged SPI back-end, mode 0, MSB first.
///
/// `Pins` - digital pins.
/// `MISO`, `MOSI`, `SCK` - pin numbers.
pub struct SoftwareSpi<Pins: DigitalPins, const MISO: u8, const MOSI: u8, const SCK: u8> {
    pins: Pins,
}

impl<Pins: DigitalPins, const MISO: u8, const MOSI: u8, const SCK: u8>
    SoftwareSpi<Pins, MISO, MOSI, SCK>
{
    /// Rejects pin numbers the pin bank does not have.
    const VALID_PINS: () = assert!(
        MISO < Pins::PIN_COUNT && MOSI < Pins::PIN_COUNT && SCK < Pins::PIN_COUNT,
        "software SPI pin out of range"
    );

    /// Creates a new [`SoftwareSpi<Pins, MISO, MOSI, SCK>`].
    pub fn new(pins: Pins) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_PINS;

        SoftwareSpi { pins }
    }

    /// Release the pins.
    pub fn free(self) -> Pins {
        self.pins
    }

    /// Pins.
    pub fn pins(&self) -> &Pins {
        &self.pins
    }

    #[cfg(test)]
    pub(crate) fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    /// Shift one byte out and one byte in.
    #[inline(always)]
    fn transfer(&mut self, data: u8) -> u8 {
        let mut received = 0;

        for bit in (0..8).rev() {
            self.pins.digital_write(MOSI, data & (1 << bit) != 0);
            self.pins.digital_write(SCK, true);
            if self.pins.digital_read(MISO) {
                received |= 1 << bit;
            }
            self.pins.digital_write(SCK, false);
        }

        received
    }
}

impl<Pins: DigitalPins, const MISO: u8, const MOSI: u8, const SCK: u8> SdSpi
    for SoftwareSpi<Pins, MISO, MOSI, SCK>
{
    fn begin(&mut self) {
        debug!("Software SPI begin, MISO: {}, MOSI: {}, SCK: {}", MISO, MOSI, SCK);

        self.pins.pin_mode(MISO, PinMode::Input);
        self.pins.pin_mode(MOSI, PinMode::Output);
        self.pins.digital_write(MOSI, true);
        self.pins.pin_mode(SCK, PinMode::Output);
        self.pins.digital_write(SCK, false);
    }

    /// Rate is set by the loop itself, `divisor` is ignored.
    fn init(&mut self, _divisor: u8) {}

    fn receive(&mut self) -> u8 {
        self.transfer(RECEIVE_TRANSFER_TOKEN)
    }

    fn receive_slice(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        for byte in buf.iter_mut() {
            *byte = self.receive();
        }

        Ok(())
    }

    fn send(&mut self, data: u8) {
        self.transfer(data);
    }

    fn send_slice(&mut self, buf: &[u8]) {
        for &byte in buf {
            self.send(byte);
        }
    }

    fn uses_transactions(&self) -> bool {
        false
    }
}
