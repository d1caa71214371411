mod client;
mod preprocess;
mod rvm;
pub mod types;

pub use client::{ClientState, ModelFactory, SegmentationClient};
pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{Matte, SegmentationModel};

use std::path::PathBuf;
use std::sync::Arc;

/// Factory for the default segmentation model (RVM).
///
/// The model file is loaded lazily, on the segmentation worker of each
/// session.
pub fn default_model_factory(model_path: impl Into<PathBuf>) -> ModelFactory {
    let model_path = model_path.into();
    Arc::new(move || -> anyhow::Result<Box<dyn SegmentationModel>> {
        let model = RobustVideoMatting::new(&model_path)?;
        Ok(Box::new(model) as Box<dyn SegmentationModel>)
    })
}
