include!(concat!(env!("OUT_DIR"), "/selector.rs"));

/// Represents timing config for the SPI back-ends.
pub trait SdSpiConfig {
    /// CPU clock frequency in Hz.
    const CPU_FREQUENCY_HZ: u32;
    /// CPU cycles spent by one iteration of the pipelined receive loop,
    /// not counting the pipeline delay itself.
    const RECEIVE_LOOP_CYCLES: u16;
    /// Lower bound of the pipeline delay in CPU cycles.
    const MIN_PIPELINE_DELAY_CYCLES: u16;
}

/// Default implementation of [`SdSpiConfig`](crate::SdSpiConfig), 16 MHz AVR.
pub struct DefaultSdSpiConfig;

impl SdSpiConfig for DefaultSdSpiConfig {
    const CPU_FREQUENCY_HZ: u32 = 16_000_000;
    const RECEIVE_LOOP_CYCLES: u16 = 8;
    const MIN_PIPELINE_DELAY_CYCLES: u16 = 8;
}

/// Back-end chosen by [`SD_SPI_CONFIGURATION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Backend {
    /// Direct register access.
    Register,
    /// Platform SPI library.
    Library,
    /// Bit-banged pins.
    Software,
}

impl Backend {
    /// Decode a selector value.
    pub const fn from_selector(selector: u8) -> Self {
        match selector {
            1 => Backend::Library,
            2 => Backend::Software,
            _ => Backend::Register,
        }
    }

    /// Whether a selector value also compiles in runtime dispatch.
    pub const fn is_dynamic_selector(selector: u8) -> bool {
        selector >= 3
    }

    /// Back-end the crate was built with.
    pub const fn selected() -> Self {
        Self::from_selector(SD_SPI_CONFIGURATION)
    }
}

/// Whether the runtime dispatch surface is compiled in.
pub const fn is_dynamic() -> bool {
    cfg!(sd_spi_dynamic)
}
