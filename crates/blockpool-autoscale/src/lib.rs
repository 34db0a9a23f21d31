//! blockpool-autoscale — block-sized worker pool growth.
//!
//! A pure decision function consulted by the scheduler only when the
//! worker pool has no idle worker. It never shrinks the pool.
//!
//! # Scaling Algorithm
//!
//! ```text
//! current = worker count
//! if current >= ceiling:
//!     AtCeiling            // caller waits for a worker to go idle
//! else:
//!     Grow(min(block_size, ceiling - current))
//! ```
//!
//! The `min` clamp keeps the last block from overshooting the ceiling
//! when `block_size` does not divide the remaining headroom.

pub mod scaler;

pub use scaler::{BlockScaler, ScaleDecision};
