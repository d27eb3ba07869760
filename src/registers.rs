use crate::{
    config::{DefaultSdSpiConfig, SdSpiConfig},
    Error, SdSpi, RECEIVE_TRANSFER_TOKEN,
};

use bitfield::bitfield;
use core::marker::PhantomData;

bitfield! {
    /// SPI control register (SPCR).
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Spcr(u8);
    impl Debug;
    pub interrupt_enable, set_interrupt_enable: 7;
    pub enable, set_enable: 6;
    pub lsb_first, set_lsb_first: 5;
    pub master, set_master: 4;
    pub clock_polarity, set_clock_polarity: 3;
    pub clock_phase, set_clock_phase: 2;
    pub u8, clock_select, set_clock_select: 1, 0;
}

bitfield! {
    /// SPI status register (SPSR).
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Spsr(u8);
    impl Debug;
    pub transfer_complete, _: 7;
    pub write_collision, _: 6;
    pub double_speed, set_double_speed: 0;
}

/// Registers touched by [`RegisterSpi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Register {
    /// SPI control register.
    Control,
    /// SPI status register.
    Status,
    /// SPI data register.
    Data,
    /// Output port of the SPI pins.
    Port,
    /// Data direction register of the SPI pins.
    Direction,
}

/// Register block of an AVR style SPI controller.
pub trait SpiRegisters {
    /// Port bit of the SD chip select (SS).
    const SS: u8;
    /// Port bit of MOSI.
    const MOSI: u8;
    /// Port bit of SCK.
    const SCK: u8;

    /// Read a register.
    fn read(&mut self, register: Register) -> u8;

    /// Write a register.
    fn write(&mut self, register: Register, value: u8);

    /// Burn at least `cycles` CPU cycles without side effects.
    fn delay_cycles(&mut self, cycles: u16);
}

/// Slowest encoded rate.
const MAX_RATE: u8 = 7;

/// Encoded rate for the fastest SCK not above `CPU / divisor`.
///
/// Rates 0..=5 and 7 map to divisors 2, 4, 8, 16, 32, 64 and 128.
pub(crate) fn rate_for_divisor(divisor: u8) -> u8 {
    let mut b: u16 = 2;
    let mut r = 0;

    while u16::from(divisor) > b && r < MAX_RATE {
        b <<= 1;
        r += if r < 5 { 1 } else { 2 };
    }

    r
}

/// SCK divisors by clock select field, without doubling.
const CLOCK_SELECT_DIVISORS: [u16; 4] = [4, 16, 64, 128];

/// CPU cycles per SCK period for a clock select field and doubling bit.
pub(crate) fn sck_divisor(clock_select: u8, double_speed: bool) -> u16 {
    let divisor = CLOCK_SELECT_DIVISORS[usize::from(clock_select & 0x03)];

    if double_speed {
        divisor / 2
    } else {
        divisor
    }
}

/// SPI back-end driving the SPI controller registers directly.
///
/// `Regs` - register block.
/// `Config` - timing config.
pub struct RegisterSpi<Regs: SpiRegisters, Config: SdSpiConfig = DefaultSdSpiConfig> {
    regs: Regs,
    rate: u8,
    pipeline_delay: u16,
    config: PhantomData<Config>,
}

impl<Regs: SpiRegisters, Config: SdSpiConfig> RegisterSpi<Regs, Config> {
    /// Rate of the controller after reset, CPU/4.
    const RESET_RATE: u8 = 1;

    /// Creates a new [`RegisterSpi<Regs, Config>`].
    pub fn new(regs: Regs) -> Self {
        RegisterSpi {
            regs,
            rate: Self::RESET_RATE,
            pipeline_delay: Self::pipeline_delay_for(Self::rate_divisor(Self::RESET_RATE)),
            config: PhantomData::<Config>,
        }
    }

    /// Release the register block.
    pub fn free(self) -> Regs {
        self.regs
    }

    /// Register block.
    pub fn registers(&self) -> &Regs {
        &self.regs
    }

    #[cfg(test)]
    pub(crate) fn registers_mut(&mut self) -> &mut Regs {
        &mut self.regs
    }

    /// Encoded rate selected by the last `init`.
    pub fn rate(&self) -> u8 {
        self.rate
    }

    /// CPU cycles per SCK period.
    pub fn sck_divisor(&self) -> u16 {
        Self::rate_divisor(self.rate)
    }

    /// SCK frequency in Hz.
    pub fn sck_frequency_hz(&self) -> u32 {
        Config::CPU_FREQUENCY_HZ / u32::from(self.sck_divisor())
    }

    /// CPU cycles burned between pipelined receive transfers.
    pub fn pipeline_delay(&self) -> u16 {
        self.pipeline_delay
    }

    fn rate_divisor(rate: u8) -> u16 {
        sck_divisor(rate >> 1, rate & 1 == 0)
    }

    /// Delay that covers one byte shift minus the loop's own cost.
    fn pipeline_delay_for(sck_divisor: u16) -> u16 {
        (8 * sck_divisor)
            .saturating_sub(Config::RECEIVE_LOOP_CYCLES)
            .max(Config::MIN_PIPELINE_DELAY_CYCLES)
    }

    /// Spin until the current transfer has shifted out.
    #[inline(always)]
    fn wait_transfer(&mut self) {
        while !Spsr(self.regs.read(Register::Status)).transfer_complete() {}
    }

    /// Set `mask` bits of a register, leaving the others.
    #[inline(always)]
    fn set_bits(&mut self, register: Register, mask: u8) {
        let value = self.regs.read(register);
        self.regs.write(register, value | mask);
    }
}

impl<Regs: SpiRegisters, Config: SdSpiConfig> SdSpi for RegisterSpi<Regs, Config> {
    fn begin(&mut self) {
        debug!("SPI begin, SS: {}, MOSI: {}, SCK: {}", Regs::SS, Regs::MOSI, Regs::SCK);

        // SS must be an output even when it is not the chip select.
        self.set_bits(Register::Port, 1 << Regs::SS);
        self.set_bits(
            Register::Direction,
            (1 << Regs::SS) | (1 << Regs::MOSI) | (1 << Regs::SCK),
        );
    }

    fn init(&mut self, divisor: u8) {
        let rate = rate_for_divisor(divisor);

        let mut control = Spcr(0);
        control.set_enable(true);
        control.set_master(true);
        control.set_clock_select(rate >> 1);

        let mut status = Spsr(0);
        status.set_double_speed(rate & 1 == 0);

        self.regs.write(Register::Control, control.0);
        self.regs.write(Register::Status, status.0);

        self.rate = rate;
        self.pipeline_delay = Self::pipeline_delay_for(self.sck_divisor());

        if u16::from(divisor) > self.sck_divisor() {
            warn!(
                "SPI divisor {} above slowest rate, using {}",
                divisor,
                self.sck_divisor()
            );
        }

        info!(
            "SPI init, divisor: {}, rate: {}, SCK: {} Hz, pipeline delay: {}",
            divisor,
            rate,
            self.sck_frequency_hz(),
            self.pipeline_delay
        );
    }

    #[inline]
    fn receive(&mut self) -> u8 {
        self.regs.write(Register::Data, RECEIVE_TRANSFER_TOKEN);
        // SPIF needs a cycle to fall after the write.
        self.regs.delay_cycles(1);
        self.wait_transfer();
        self.regs.read(Register::Data)
    }

    fn receive_slice(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let Some((last, head)) = buf.split_last_mut() else {
            return Ok(());
        };

        self.regs.write(Register::Data, RECEIVE_TRANSFER_TOKEN);
        self.wait_transfer();

        // The delay stands in for polling SPIF, the next byte is complete
        // when it runs out.
        for byte in head.iter_mut() {
            let b = self.regs.read(Register::Data);
            self.regs.write(Register::Data, RECEIVE_TRANSFER_TOKEN);
            *byte = b;
            self.regs.delay_cycles(self.pipeline_delay);
        }

        self.wait_transfer();
        *last = self.regs.read(Register::Data);

        Ok(())
    }

    #[inline]
    fn send(&mut self, data: u8) {
        self.regs.write(Register::Data, data);
        // SPIF needs a cycle to fall after the write.
        self.regs.delay_cycles(1);
        self.wait_transfer();
    }

    fn send_slice(&mut self, buf: &[u8]) {
        let Some((&first, rest)) = buf.split_first() else {
            return;
        };

        self.regs.write(Register::Data, first);

        // Next byte is fetched before the spin so SPDR is reloaded as soon as
        // SPIF rises.
        for &b in rest {
            self.wait_transfer();
            self.regs.write(Register::Data, b);
        }

        self.wait_transfer();
    }

    fn uses_transactions(&self) -> bool {
        true
    }
}
