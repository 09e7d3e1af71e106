pub mod asset;
pub mod input;
pub mod job;
