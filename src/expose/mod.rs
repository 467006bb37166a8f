//! Exposed previews
//!
//! A second, opt-in preview listener reachable under a custom domain for a
//! bounded time. It shares the port and certificate machinery of the always-on
//! preview but owns its own server, hosts entries and expiry timer.

mod controller;
#[cfg(test)]
mod tests;

pub use controller::{ExposeController, ExposeOptions, ExposeStatus};
