//! Crate-level test trees, aggregated separately from the `#[cfg(test)]
//! mod tests` blocks living next to the code they exercise. Those cover a
//! single module's own invariants; these drive several modules together —
//! the literal end-to-end scenarios of §8 and broader property checks.
//!
//! Run with a single test thread (`.cargo/config.toml` sets
//! `RUST_TEST_THREADS=1`): the thread/mutex/semaphore/DMA arenas and the
//! runqueue are process-wide statics, matching the single real per-CPU
//! block this crate targets, so parallel test threads would race them.

mod helpers;
mod integration;
mod property;
mod stress;
