use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::{Array1, Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    // Recurrent hidden states
    // These are updated after each inference and fed back in the next frame
    r1: Option<Array4<f32>>,
    r2: Option<Array4<f32>>,
    r3: Option<Array4<f32>>,
    r4: Option<Array4<f32>>,

    // Downsample ratio fed to the model and used to size hidden states
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    ///
    /// # Default Configuration
    /// - Input size: 512x512 (can be adjusted for performance/quality tradeoff)
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            r1: None,
            r2: None,
            r3: None,
            r4: None,
            downsample_ratio: 0.25,
        })
    }

    /// Initialize hidden states to zeros
    fn init_hidden_states(&mut self) {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        self.r1 = Some(Array4::zeros((1, 16, h / 2, w / 2)));
        self.r2 = Some(Array4::zeros((1, 20, h / 4, w / 4)));
        self.r3 = Some(Array4::zeros((1, 40, h / 8, w / 8)));
        self.r4 = Some(Array4::zeros((1, 64, h / 16, w / 16)));
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        // Initialize hidden states on first frame
        if self.r1.is_none() {
            self.init_hidden_states();
        }

        let input_tensor = self.preprocessor.preprocess(frame);
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        let (Some(r1), Some(r2), Some(r3), Some(r4)) = (&self.r1, &self.r2, &self.r3, &self.r4)
        else {
            bail!("RVM hidden states are not initialized");
        };

        // RVM expects: src, r1i, r2i, r3i, r4i, downsample_ratio
        // and returns: fgr, pha, r1o, r2o, r3o, r4o
        let (pha, states) = {
            let _infer_span = tracing::debug_span!("inference").entered();
            let outputs = self
                .session
                .run(ort::inputs![
                    TensorRef::from_array_view(&input_tensor)?,
                    TensorRef::from_array_view(r1)?,
                    TensorRef::from_array_view(r2)?,
                    TensorRef::from_array_view(r3)?,
                    TensorRef::from_array_view(r4)?,
                    TensorRef::from_array_view(&ratio)?
                ])
                .context("Failed to run inference")?;

            let pha = outputs[1]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix4>()?;

            let mut states = Vec::with_capacity(4);
            for index in 2..6 {
                states.push(
                    outputs[index]
                        .try_extract_array::<f32>()?
                        .to_owned()
                        .into_dimensionality::<Ix4>()?,
                );
            }
            (pha, states)
        };

        // Update hidden states for next frame
        let mut states = states.into_iter();
        self.r1 = states.next();
        self.r2 = states.next();
        self.r3 = states.next();
        self.r4 = states.next();

        // Matte shape: [1, 1, H, W]
        let shape = pha.shape();
        let (height, width) = (shape[2] as u32, shape[3] as u32);

        Ok(Matte {
            width,
            height,
            values: pha.iter().copied().collect(),
        })
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.r1 = None;
        self.r2 = None;
        self.r3 = None;
        self.r4 = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
