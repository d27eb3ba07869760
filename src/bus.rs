//! Caller-side bracketing of SD card operations.
//!
//! Back-ends never lock the bus themselves. An SD layer that shares the bus
//! with other devices wraps each command and its data phase in
//! [`CardBus::scope`], which takes the shared-bus lock only for back-ends that
//! report [`SdSpi::uses_transactions`].

use crate::SdSpi;

use switch_hal::OutputSwitch;

/// [`CardBus`] result error.
///
/// `S` - select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Error<S> {
    /// Couldn't set the chip select.
    Select(S),
    /// Transfer failed inside the scope.
    Transfer(crate::Error),
}

impl<S> From<crate::Error> for Error<S> {
    fn from(err: crate::Error) -> Self {
        Error::Transfer(err)
    }
}

/// Cooperative mutual exclusion on a shared SPI bus.
pub trait BusLock {
    /// Acquire the bus.
    fn begin_transaction(&mut self);

    /// Release the bus.
    fn end_transaction(&mut self);
}

/// Lock for a bus dedicated to the SD card.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl BusLock for NoLock {
    fn begin_transaction(&mut self) {}

    fn end_transaction(&mut self) {}
}

/// SPI back-end bundled with the card chip select and the bus lock.
///
/// `Spi` - SPI back-end.
/// `Cs` - Chip select output switch.
/// `Lock` - Shared bus lock.
pub struct CardBus<Spi: SdSpi, Cs: OutputSwitch, Lock: BusLock = NoLock> {
    spi: Spi,
    cs: Cs,
    lock: Lock,
}

impl<Spi: SdSpi, Cs: OutputSwitch> CardBus<Spi, Cs, NoLock>
where
    Cs::Error: core::fmt::Debug,
{
    /// Creates a new [`CardBus`] on a dedicated bus.
    pub fn new(spi: Spi, cs: Cs) -> Self {
        Self::with_lock(spi, cs, NoLock)
    }
}

impl<Spi: SdSpi, Cs: OutputSwitch, Lock: BusLock> CardBus<Spi, Cs, Lock>
where
    Cs::Error: core::fmt::Debug,
{
    /// Creates a new [`CardBus`] sharing the bus through `lock`.
    pub fn with_lock(spi: Spi, cs: Cs, lock: Lock) -> Self {
        CardBus { spi, cs, lock }
    }

    /// Release the parts.
    pub fn free(self) -> (Spi, Cs, Lock) {
        (self.spi, self.cs, self.lock)
    }

    /// SPI back-end, outside of any scope.
    pub fn spi(&mut self) -> &mut Spi {
        &mut self.spi
    }

    /// Lock.
    pub fn lock(&self) -> &Lock {
        &self.lock
    }

    /// Chip select switch.
    pub fn cs(&self) -> &Cs {
        &self.cs
    }

    /// Deselect the card and set the bus up, see [`SdSpi::begin`].
    pub fn begin(&mut self, divisor: u8) -> Result<(), Error<Cs::Error>> {
        self.spi.begin();
        self.spi.init(divisor);
        self.cs.off().map_err(Error::Select)
    }

    /// Run `f` with the card selected, bracketed by the bus lock when the
    /// back-end shares its bus.
    ///
    /// The card is deselected and the lock released even when `f` fails.
    pub fn scope<F, R>(&mut self, f: F) -> Result<R, Error<Cs::Error>>
    where
        F: FnOnce(&mut Spi) -> Result<R, crate::Error>,
    {
        let transactions = self.spi.uses_transactions();
        if transactions {
            self.lock.begin_transaction();
        }

        let result = self.select_scope(f);

        if transactions {
            self.lock.end_transaction();
        }

        result
    }

    /// CS scope.
    fn select_scope<F, R>(&mut self, f: F) -> Result<R, Error<Cs::Error>>
    where
        F: FnOnce(&mut Spi) -> Result<R, crate::Error>,
    {
        if let Err(err) = self.cs.on() {
            error!("Failed to select SD card: {}", debug2format!(err));
            return Err(Error::Select(err));
        }

        let result = f(&mut self.spi).map_err(Error::Transfer);

        if let Err(err) = self.cs.off() {
            error!("Failed to deselect SD card: {}", debug2format!(err));
            return result.and(Err(Error::Select(err)));
        }

        result
    }
}
