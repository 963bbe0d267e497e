pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod errors;
pub mod evaluate;
pub mod gates;
pub mod generator;
pub mod instruments;
pub mod pipeline;
pub mod plan;
pub mod realize;
pub mod render;
pub mod score;
pub mod theory;
pub mod ui;
pub mod util;
