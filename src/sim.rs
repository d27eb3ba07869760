//! Simulated hardware for unit tests.
//!
//! Every register access costs one CPU cycle. With no scripted card bytes the
//! models behave as if MOSI were wired to MISO.

use crate::{
    avr::{MOSI_BIT, SCK_BIT, SS_BIT},
    library::{BitOrder, PlatformSpi},
    registers::{sck_divisor, Register, Spcr, SpiRegisters},
    software::{DigitalPins, PinMode},
    SdSpiConfig,
};

use embedded_hal::spi::Mode;
use std::collections::VecDeque;

/// Timing matching the one-cycle-per-access cost of [`SimRegisters`].
pub struct SimConfig;

impl SdSpiConfig for SimConfig {
    const CPU_FREQUENCY_HZ: u32 = 16_000_000;
    const RECEIVE_LOOP_CYCLES: u16 = 1;
    const MIN_PIPELINE_DELAY_CYCLES: u16 = 8;
}

/// Byte being shifted.
struct InFlight {
    tx: u8,
    rx: u8,
    done_at: u64,
}

/// SPI controller model.
///
/// SPIF is set when a byte has shifted and cleared by an SPSR read that saw
/// it set followed by an SPDR access. SPDR reads during a transfer return the
/// previous byte, SPDR writes during a transfer collide and are dropped.
pub struct SimRegisters {
    pub now: u64,
    control: u8,
    double_speed: bool,
    pub port: u8,
    pub ddr: u8,
    spif: bool,
    spif_seen: bool,
    in_flight: Option<InFlight>,
    received: u8,
    card: VecDeque<u8>,
    /// Bytes that completed on MOSI.
    pub mosi: Vec<u8>,
    pub sck_edges: u64,
    pub collisions: usize,
    sck_period: u16,
}

impl SimRegisters {
    pub fn new() -> Self {
        SimRegisters {
            now: 0,
            control: 0,
            double_speed: false,
            port: 0,
            ddr: 0,
            spif: false,
            spif_seen: false,
            in_flight: None,
            received: 0,
            card: VecDeque::new(),
            mosi: Vec::new(),
            sck_edges: 0,
            collisions: 0,
            sck_period: 0,
        }
    }

    /// Queue bytes the card shifts out on the next transfers.
    pub fn script(&mut self, bytes: &[u8]) {
        self.card.extend(bytes.iter().copied());
    }

    pub fn control(&self) -> Spcr {
        Spcr(self.control)
    }

    /// CPU cycles per SCK period of the last transfer.
    pub fn last_sck_period(&self) -> u16 {
        self.sck_period
    }

    fn tick(&mut self, cycles: u64) {
        self.now += cycles;

        if let Some(done) = self.in_flight.take_if(|t| t.done_at <= self.now) {
            self.received = done.rx;
            self.mosi.push(done.tx);
            self.sck_edges += 8;
            self.spif = true;
        }
    }

    fn touch_data(&mut self) {
        if self.spif_seen {
            self.spif = false;
            self.spif_seen = false;
        }
    }

    fn start(&mut self, tx: u8) {
        let control = Spcr(self.control);
        assert!(control.enable() && control.master(), "SPI not enabled as master");

        if self.in_flight.is_some() {
            self.collisions += 1;
            return;
        }

        self.sck_period = sck_divisor(control.clock_select(), self.double_speed);
        self.in_flight = Some(InFlight {
            tx,
            rx: self.card.pop_front().unwrap_or(tx),
            done_at: self.now + 8 * u64::from(self.sck_period),
        });
    }
}

impl SpiRegisters for SimRegisters {
    const SS: u8 = SS_BIT;
    const MOSI: u8 = MOSI_BIT;
    const SCK: u8 = SCK_BIT;

    fn read(&mut self, register: Register) -> u8 {
        self.tick(1);

        match register {
            Register::Control => self.control,
            Register::Status => {
                assert!(
                    self.spif || self.in_flight.is_some(),
                    "polling SPIF with nothing in flight"
                );
                self.spif_seen = self.spif;
                (u8::from(self.spif) << 7) | u8::from(self.double_speed)
            }
            Register::Data => {
                self.touch_data();
                self.received
            }
            Register::Port => self.port,
            Register::Direction => self.ddr,
        }
    }

    fn write(&mut self, register: Register, value: u8) {
        self.tick(1);

        match register {
            Register::Control => self.control = value,
            Register::Status => self.double_speed = value & 1 != 0,
            Register::Data => {
                self.touch_data();
                self.start(value);
            }
            Register::Port => self.port = value,
            Register::Direction => self.ddr = value,
        }
    }

    fn delay_cycles(&mut self, cycles: u16) {
        self.tick(u64::from(cycles));
    }
}

/// GPIO bank with an SPI card on three of its pins.
///
/// The card samples MOSI on rising SCK edges and shifts its next bit out on
/// falling edges.
pub struct SimPins {
    miso: u8,
    mosi_pin: u8,
    sck: u8,
    modes: [Option<PinMode>; 20],
    levels: [bool; 20],
    card: VecDeque<u8>,
    out_byte: Option<u8>,
    out_bit: u8,
    in_byte: u8,
    in_bits: u8,
    /// Bits sampled on MOSI, one entry per rising edge.
    pub mosi_bits: Vec<u8>,
    /// Bytes sampled on MOSI.
    pub mosi: Vec<u8>,
    pub rising_edges: usize,
    pub falling_edges: usize,
    pub mosi_changes_while_high: usize,
}

impl SimPins {
    pub fn new(miso: u8, mosi: u8, sck: u8) -> Self {
        SimPins {
            miso,
            mosi_pin: mosi,
            sck,
            modes: [None; 20],
            levels: [false; 20],
            card: VecDeque::new(),
            out_byte: None,
            out_bit: 0,
            in_byte: 0,
            in_bits: 0,
            mosi_bits: Vec::new(),
            mosi: Vec::new(),
            rising_edges: 0,
            falling_edges: 0,
            mosi_changes_while_high: 0,
        }
    }

    /// Queue bytes the card shifts out on the next transfers.
    pub fn script(&mut self, bytes: &[u8]) {
        self.card.extend(bytes.iter().copied());
    }

    pub fn mode(&self, pin: u8) -> Option<PinMode> {
        self.modes[usize::from(pin)]
    }

    pub fn level(&self, pin: u8) -> bool {
        self.levels[usize::from(pin)]
    }

    fn rising_edge(&mut self) {
        self.rising_edges += 1;

        let bit = self.level(self.mosi_pin);
        self.mosi_bits.push(u8::from(bit));
        self.in_byte = (self.in_byte << 1) | u8::from(bit);
        self.in_bits += 1;

        if self.in_bits == 8 {
            self.mosi.push(self.in_byte);
            self.in_bits = 0;
        }
    }

    fn falling_edge(&mut self) {
        self.falling_edges += 1;

        self.out_bit += 1;
        if self.out_bit == 8 {
            self.out_bit = 0;
            self.out_byte = None;
        }
    }
}

impl DigitalPins for SimPins {
    const PIN_COUNT: u8 = 20;

    fn pin_mode(&mut self, pin: u8, mode: PinMode) {
        self.modes[usize::from(pin)] = Some(mode);
    }

    fn digital_write(&mut self, pin: u8, high: bool) {
        assert_eq!(self.mode(pin), Some(PinMode::Output), "pin {} is not an output", pin);

        let was = self.level(pin);
        self.levels[usize::from(pin)] = high;

        if pin == self.sck {
            match (was, high) {
                (false, true) => self.rising_edge(),
                (true, false) => self.falling_edge(),
                _ => {}
            }
        } else if pin == self.mosi_pin && was != high && self.level(self.sck) {
            self.mosi_changes_while_high += 1;
        }
    }

    fn digital_read(&mut self, pin: u8) -> bool {
        assert_eq!(self.mode(pin), Some(PinMode::Input), "pin {} is not an input", pin);
        assert_eq!(pin, self.miso, "only MISO is wired");

        if self.out_byte.is_none() {
            self.out_byte = self.card.pop_front();
        }

        match self.out_byte {
            Some(byte) => byte & (0x80 >> self.out_bit) != 0,
            None => self.level(self.mosi_pin),
        }
    }
}

/// Platform SPI service recording its configuration and wire traffic.
pub struct SimPlatform<const FIXED: bool> {
    pub begun: bool,
    pub bit_order: Option<BitOrder>,
    pub mode: Option<Mode>,
    pub divider: Option<u8>,
    /// Bytes sent.
    pub wire: Vec<u8>,
    card: VecDeque<u8>,
}

impl<const FIXED: bool> SimPlatform<FIXED> {
    pub fn new() -> Self {
        SimPlatform {
            begun: false,
            bit_order: None,
            mode: None,
            divider: None,
            wire: Vec::new(),
            card: VecDeque::new(),
        }
    }

    /// Queue bytes the card shifts out on the next transfers.
    pub fn script(&mut self, bytes: &[u8]) {
        self.card.extend(bytes.iter().copied());
    }
}

impl<const FIXED: bool> PlatformSpi for SimPlatform<FIXED> {
    const FIXED_DIVIDERS: bool = FIXED;

    fn begin(&mut self) {
        self.begun = true;
    }

    fn set_bit_order(&mut self, order: BitOrder) {
        self.bit_order = Some(order);
    }

    fn set_data_mode(&mut self, mode: Mode) {
        self.mode = Some(mode);
    }

    fn set_clock_divider(&mut self, divider: u8) {
        self.divider = Some(divider);
    }

    fn transfer(&mut self, data: u8) -> u8 {
        assert!(self.begun, "transfer before begin");
        self.wire.push(data);
        self.card.pop_front().unwrap_or(data)
    }
}
