#![forbid(unsafe_code)]

pub mod advice;
pub mod axis;
pub mod common;
pub mod episode;
pub mod learning_state;
pub mod meal;
pub mod snapshot;
pub mod summary;
pub mod tick;

pub use common::{clamp_unit, ContractViolation, MonotonicTimeMs, Validate};
