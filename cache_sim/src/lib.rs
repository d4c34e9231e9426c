pub mod addr;
pub mod cache;
pub mod common;
pub mod observer;
pub mod recency;
pub mod sim;
pub mod trace;

#[cfg(feature = "stat")]
pub mod stat;
