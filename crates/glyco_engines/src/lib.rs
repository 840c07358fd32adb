#![forbid(unsafe_code)]

pub mod advice_emitter;
pub mod axis_scorer;
pub mod confidence;
pub mod episode_summary;
pub mod episode_tracker;
pub mod learning_adjuster;
pub mod learning_params;
pub mod meal_intent;
