//! Deterministic random number generation
//!
//! Uses xorshift64* seeded through splitmix64. All randomness in the kernel
//! and in agent behaviors MUST go through this module.

mod xorshift;

pub use xorshift::RngManager;
