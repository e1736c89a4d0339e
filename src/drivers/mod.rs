//! Hardware backends for the monitor control channel.

pub mod ddc;

pub use ddc::DdcBus;
