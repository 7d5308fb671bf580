// Logging shim: defmt on the device, `log` on the host. With neither backend
// the arguments are still type-checked through `format_args!`.

#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "no_std")]
        defmt::trace!($($arg)*);
        #[cfg(feature = "std")]
        log::trace!($($arg)*);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "no_std")]
        defmt::debug!($($arg)*);
        #[cfg(feature = "std")]
        log::debug!($($arg)*);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "no_std")]
        defmt::info!($($arg)*);
        #[cfg(feature = "std")]
        log::info!($($arg)*);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "no_std")]
        defmt::warn!($($arg)*);
        #[cfg(feature = "std")]
        log::warn!($($arg)*);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = format_args!($($arg)*);
    }};
}

macro_rules! error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "no_std")]
        defmt::error!($($arg)*);
        #[cfg(feature = "std")]
        log::error!($($arg)*);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = format_args!($($arg)*);
    }};
}

// Driver error types are only required to be `Debug`, which defmt cannot
// print directly.
macro_rules! driver_error {
    ($what:expr, $err:expr) => {{
        #[cfg(feature = "no_std")]
        defmt::error!("{}: {}", $what, defmt::Debug2Format(&$err));
        #[cfg(feature = "std")]
        log::error!("{}: {:?}", $what, $err);
        #[cfg(not(any(feature = "std", feature = "no_std")))]
        let _ = (&$what, &$err);
    }};
}
