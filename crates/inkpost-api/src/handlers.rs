//! Request handlers.

pub mod admin;
pub mod generations;
pub mod health;
pub mod jobs;
pub mod payouts;

pub use health::{health, ready};
