pub mod artifacts;
pub mod contract;
pub mod exercises;
pub mod measurement;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod prompts;
pub mod render;
pub mod report;
pub mod scoring;
