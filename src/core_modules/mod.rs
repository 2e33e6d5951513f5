pub mod annotation;
pub mod associator;
pub mod blob_detector;
pub mod classifier;
pub mod detection;
pub mod features;
pub mod lifecycle;
pub mod reaper;
pub mod track_store;
