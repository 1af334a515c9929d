mod annotation;
mod async_task;
mod config;
mod controller;
mod mask;
mod predictor;
mod prompt;
mod surface;

pub mod app;
#[cfg(feature = "sam")]
pub mod inference;

pub use annotation::{AnnotationState, Label, Point};
pub use async_task::AsyncTask;
pub use config::Config;
pub use controller::{
    InteractionController, InteractionError, Phase, ACCEPT_CONFIDENCE, BACKGROUND_MARKER,
    FOREGROUND_MARKER,
};
pub use mask::{Mask, MaskStyle};
pub use predictor::{Prediction, Predictor, PredictorError, RawLogits};
pub use prompt::{BoundingBox, PromptBatch, Seed};
pub use surface::{PointerButton, PointerPress, Surface};

pub use app::{run_native, OverlaySettings};
