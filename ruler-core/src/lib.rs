pub mod labels;
pub mod metrics;
pub mod strategy;

pub use labels::{Label, Labels, is_valid_label_name};
pub use strategy::PartialResponseStrategy;
