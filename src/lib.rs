pub mod bootstrap;
pub mod common;
pub mod config;
pub mod database;
pub mod models;
pub mod queue;
pub mod repository;
pub mod storage;
pub mod utils;
pub mod workflow;

pub use common::errors::{AssetError, AssetResult};
pub use config::kinds::{AssetKindConfig, KindRegistry, VersionSpec};
pub use models::asset::{Asset, AssetFormat, AssetId, AssetState, OwnerRef};
pub use models::input::AssetInput;
pub use workflow::processors::{Pipeline, Processor};
pub use workflow::worker::{WorkOutcome, Worker};
pub use workflow::{Lifecycle, Mode, Transition};
