pub mod batch;
pub mod cache;
pub mod events;
pub mod report;
pub mod settings;
pub mod status;
