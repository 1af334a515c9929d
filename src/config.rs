use std::path::PathBuf;

use crate::{app::OverlaySettings, MaskStyle};

/// Demo configuration, read from a `config.json` next to the binary. A
/// missing file falls back to the defaults.
#[derive(Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the SAM encoder/decoder ONNX files.
    pub sam_path: PathBuf,
    pub image: PathBuf,
    /// Optional JSON file with `[x, y]` centroid seeds for whole-image
    /// prediction.
    pub centroids: Option<PathBuf>,
    pub mask_style: MaskStyle,
    pub overlay: OverlaySettings,
    pub viewport: [f32; 2],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sam_path: "sam".into(),
            image: "image.png".into(),
            centroids: None,
            mask_style: MaskStyle::default(),
            overlay: OverlaySettings::default(),
            viewport: [800.0, 800.0],
        }
    }
}
