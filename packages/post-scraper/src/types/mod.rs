//! Data types for the scraping engine.

pub mod paths;
pub mod settings;
pub mod state;
pub mod thread;
pub mod timestamp;
