#![forbid(unsafe_code)]

pub mod error;
pub mod learning_store;

pub use error::StorageError;
pub use learning_store::{
    FileLearningSlot, InMemoryLearningSlot, LearningSlot, LearningStore, RestoreOutcome,
};
