use std::io;
use std::path::{Path, PathBuf};

use eframe::egui;
use log::info;

use crate::{app::PredictorFactory, Config, Point, PromptBatch};

use super::PromptApp;

pub fn run_native(factory: PredictorFactory) -> Result<(), eframe::Error> {
    env_logger::init();

    let mut config: Config = match std::fs::File::open("config.json") {
        Ok(f) => serde_json::from_reader(f).map_err(|e| eframe::Error::AppCreation(Box::new(e)))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
        Err(e) => Err(eframe::Error::AppCreation(Box::new(e)))?,
    };
    if let Some(image) = std::env::args().nth(1) {
        config.image = PathBuf::from(image);
    }

    let batch = config
        .centroids
        .as_deref()
        .map(load_centroids)
        .transpose()?;

    info!("Run with config: {config:?}");
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size(config.viewport),
        ..Default::default()
    };

    eframe::run_native(
        "Prompt overlay",
        options,
        Box::new(move |cc| Ok(Box::new(PromptApp::new(cc, config, batch, factory)))),
    )
}

/// Centroid seeds as a JSON list of `[x, y]` pairs, in the order they should
/// be composited.
fn load_centroids(path: &Path) -> Result<PromptBatch, eframe::Error> {
    let file = std::fs::File::open(path).map_err(|e| eframe::Error::AppCreation(Box::new(e)))?;
    let coords: Vec<(f32, f32)> =
        serde_json::from_reader(file).map_err(|e| eframe::Error::AppCreation(Box::new(e)))?;
    Ok(PromptBatch::Centroids(
        coords.into_iter().map(Point::from).collect(),
    ))
}
