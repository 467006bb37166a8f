//! Session lifetime bounding
//!
//! [`SessionTimeout`] expires an exposed preview (or any test session) after a
//! fixed window. What expiry means is up to the owner's callback.

mod timeout;
#[cfg(test)]
mod tests;

pub use timeout::SessionTimeout;
