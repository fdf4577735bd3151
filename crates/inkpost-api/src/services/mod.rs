//! Background services.

pub mod sweep;

pub use sweep::Sweeper;
