/// GPIO port of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Port {
    B,
    C,
    D,
}

/// Port and bit mask of an Arduino Uno digital pin.
///
/// Digital pins 0..=7 are PORTD, 8..=13 are PORTB and 14..=19 are PORTC.
pub fn locate(pin: u8) -> (Port, u8) {
    match pin {
        0..=7 => (Port::D, 1 << pin),
        8..=13 => (Port::B, 1 << (pin - 8)),
        _ => (Port::C, 1 << ((pin - 14) & 0x07)),
    }
}

/// Port B bit of SS, digital pin 10.
pub const SS_BIT: u8 = 2;
/// Port B bit of MOSI, digital pin 11.
pub const MOSI_BIT: u8 = 3;
/// Port B bit of SCK, digital pin 13.
pub const SCK_BIT: u8 = 5;

#[cfg(target_arch = "avr")]
pub use self::device::Atmega328p;

#[cfg(target_arch = "avr")]
mod device {
    use super::{locate, Port, MOSI_BIT, SCK_BIT, SS_BIT};
    use crate::{
        registers::{Register, SpiRegisters},
        software::{DigitalPins, PinMode},
    };

    use avr_device::atmega328p::{PORTB, PORTC, PORTD, SPI};

    /// ATmega328P peripherals used by the SPI back-ends.
    pub struct Atmega328p {
        spi: SPI,
        portb: PORTB,
        portc: PORTC,
        portd: PORTD,
    }

    /// Read-modify-write of the pin bits in `mask`.
    macro_rules! modify_bits {
        ($reg:expr, $mask:expr, $set:expr) => {
            $reg.modify(|r, w| {
                let bits = if $set { r.bits() | $mask } else { r.bits() & !$mask };
                // SAFETY: every bit of the port registers is a pin.
                unsafe { w.bits(bits) }
            })
        };
    }

    impl Atmega328p {
        /// Rough CPU cycles of one iteration of the delay loop, rounded down.
        const CYCLES_PER_DELAY_ITERATION: u16 = 4;

        /// Creates a new [`Atmega328p`] from the taken peripherals.
        pub fn new(spi: SPI, portb: PORTB, portc: PORTC, portd: PORTD) -> Self {
            Atmega328p {
                spi,
                portb,
                portc,
                portd,
            }
        }

        /// Release the peripherals.
        pub fn free(self) -> (SPI, PORTB, PORTC, PORTD) {
            (self.spi, self.portb, self.portc, self.portd)
        }

        /// Set or clear pins on a data direction register.
        fn set_direction(&mut self, port: Port, mask: u8, output: bool) {
            match port {
                Port::B => {
                    modify_bits!(self.portb.ddrb, mask, output);
                }
                Port::C => {
                    modify_bits!(self.portc.ddrc, mask, output);
                }
                Port::D => {
                    modify_bits!(self.portd.ddrd, mask, output);
                }
            }
        }

        /// Set or clear pins on an output register.
        fn set_output(&mut self, port: Port, mask: u8, high: bool) {
            match port {
                Port::B => {
                    modify_bits!(self.portb.portb, mask, high);
                }
                Port::C => {
                    modify_bits!(self.portc.portc, mask, high);
                }
                Port::D => {
                    modify_bits!(self.portd.portd, mask, high);
                }
            }
        }
    }

    impl SpiRegisters for Atmega328p {
        const SS: u8 = SS_BIT;
        const MOSI: u8 = MOSI_BIT;
        const SCK: u8 = SCK_BIT;

        #[inline(always)]
        fn read(&mut self, register: Register) -> u8 {
            match register {
                Register::Control => self.spi.spcr.read().bits(),
                Register::Status => self.spi.spsr.read().bits(),
                Register::Data => self.spi.spdr.read().bits(),
                Register::Port => self.portb.portb.read().bits(),
                Register::Direction => self.portb.ddrb.read().bits(),
            }
        }

        #[inline(always)]
        fn write(&mut self, register: Register, value: u8) {
            // SAFETY: the values come from the `Spcr`/`Spsr` layouts or are
            // whole data/port bytes, all valid for these registers.
            match register {
                Register::Control => {
                    self.spi.spcr.write(|w| unsafe { w.bits(value) });
                }
                Register::Status => {
                    self.spi.spsr.write(|w| unsafe { w.bits(value) });
                }
                Register::Data => {
                    self.spi.spdr.write(|w| unsafe { w.bits(value) });
                }
                Register::Port => {
                    self.portb.portb.write(|w| unsafe { w.bits(value) });
                }
                Register::Direction => {
                    self.portb.ddrb.write(|w| unsafe { w.bits(value) });
                }
            }
        }

        #[inline(always)]
        fn delay_cycles(&mut self, cycles: u16) {
            for _ in 0..cycles.div_ceil(Self::CYCLES_PER_DELAY_ITERATION) {
                avr_device::asm::nop();
            }
        }
    }

    impl DigitalPins for Atmega328p {
        const PIN_COUNT: u8 = 20;

        #[inline(always)]
        fn pin_mode(&mut self, pin: u8, mode: PinMode) {
            let (port, mask) = locate(pin);

            match mode {
                PinMode::Input => {
                    self.set_direction(port, mask, false);
                    self.set_output(port, mask, false);
                }
                PinMode::InputPullup => {
                    self.set_direction(port, mask, false);
                    self.set_output(port, mask, true);
                }
                PinMode::Output => self.set_direction(port, mask, true),
            }
        }

        #[inline(always)]
        fn digital_write(&mut self, pin: u8, high: bool) {
            let (port, mask) = locate(pin);
            self.set_output(port, mask, high);
        }

        #[inline(always)]
        fn digital_read(&mut self, pin: u8) -> bool {
            let (port, mask) = locate(pin);
            let input = match port {
                Port::B => self.portb.pinb.read().bits(),
                Port::C => self.portc.pinc.read().bits(),
                Port::D => self.portd.pind.read().bits(),
            };
            input & mask != 0
        }
    }
}
