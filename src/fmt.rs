//! Logging macros.
//!
//! Messages go to `defmt` with the `defmt-log` feature, to `log` with the `log`
//! feature, and are compiled out otherwise. Format strings must stay within the
//! subset both backends understand (`{}` and `{:02X}` style placeholders).

#![allow(unused_macros)]

macro_rules! log_impl {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "defmt-log")]
        ::defmt::$level!($s $(, $x)*);
        #[cfg(all(feature = "log", not(feature = "defmt-log")))]
        ::log::$level!($s $(, $x)*);
        #[cfg(not(any(feature = "log", feature = "defmt-log")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! trace {
    ($($arg:tt)*) => { log_impl!(trace, $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { log_impl!(debug, $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { log_impl!(info, $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { log_impl!(warn, $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { log_impl!(error, $($arg)*) };
}

/// Wrap a `Debug` value for the `{}` placeholder of either backend.
macro_rules! debug2format {
    ($e:expr) => {{
        #[cfg(feature = "defmt-log")]
        let wrapped = ::defmt::Debug2Format(&$e);
        #[cfg(not(feature = "defmt-log"))]
        let wrapped = $crate::fmt::Debug2Format(&$e);
        wrapped
    }};
}

/// `Display` through `Debug`, the `log` counterpart of `defmt::Debug2Format`.
#[cfg(not(feature = "defmt-log"))]
pub(crate) struct Debug2Format<'a, T: core::fmt::Debug + ?Sized>(pub &'a T);

#[cfg(not(feature = "defmt-log"))]
impl<T: core::fmt::Debug + ?Sized> core::fmt::Display for Debug2Format<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self.0, f)
    }
}
