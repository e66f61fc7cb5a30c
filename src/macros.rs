#![allow(unused_macros)]

#[cfg(feature = "defmt-logging")]
macro_rules! hcp_log {
    (trace,   $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug,   $($arg:expr),*) => { defmt::debug!($($arg),*) };
    (info,    $($arg:expr),*) => { defmt::info!($($arg),*) };
    (warn,    $($arg:expr),*) => { defmt::warn!($($arg),*) };
    (error,   $($arg:expr),*) => { defmt::error!($($arg),*) };
}

#[cfg(not(feature = "defmt-logging"))]
macro_rules! hcp_log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
}

macro_rules! hcp_trace {
    ($($arg:expr),*) => (hcp_log!(trace, $($arg),*));
}

macro_rules! hcp_debug {
    ($($arg:expr),*) => (hcp_log!(debug, $($arg),*));
}

macro_rules! hcp_info {
    ($($arg:expr),*) => (hcp_log!(info, $($arg),*));
}

macro_rules! hcp_warn {
    ($($arg:expr),*) => (hcp_log!(warn, $($arg),*));
}

macro_rules! hcp_error {
    ($($arg:expr),*) => (hcp_log!(error, $($arg),*));
}
