//! Resource descriptors, derived views, and entry weighting.

pub mod descriptor;
pub mod view;
pub mod weigh;
