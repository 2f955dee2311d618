//! Prize draw: weighted selection, the roll animation, and the attempt flow around them.

pub mod animator;
pub mod engine;
pub mod service;

pub use animator::{RollAnimator, RollHandle, RollState, RollTiming};
pub use engine::DrawEngine;
pub use service::{DrawAttempt, DrawReceipt, DrawService};
