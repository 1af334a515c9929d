use std::{path::Path, sync::Arc};

use futures::{future::BoxFuture, FutureExt};
use image::DynamicImage;
use log::debug;
use ndarray::{s, Array};
use ort::{Environment, OrtError, Session, SessionBuilder, Value};

use crate::{Label, Point, Prediction, Predictor, PredictorError, RawLogits, Seed};

use super::{mask_from_scores, prepare_image_input, SamEmbeddings};

impl From<OrtError> for PredictorError {
    fn from(value: OrtError) -> Self {
        Self::Session(Arc::new(value))
    }
}

/// ONNX-backed SAM predictor for one image.
///
/// The encoder runs exactly once, at construction; every predict call is a
/// decoder pass against the cached embeddings, so repeated calls with
/// disjoint prompts are independent of each other.
pub struct SamPredictor {
    decoder: Arc<Session>,
    embeddings: Arc<SamEmbeddings>,
}

impl SamPredictor {
    /// Builds the sessions and embeds `img`. The encoder pass is the slow
    /// part and runs on a worker thread.
    pub fn load(path: &Path, img: Arc<DynamicImage>) -> BoxFuture<'static, Result<Self, PredictorError>> {
        let path = path.to_path_buf();
        let (tx, rx) = futures::channel::oneshot::channel();
        let handle = std::thread::spawn(move || tx.send(Self::load_blocking(&path, &img)));
        async move {
            let r = rx
                .await
                .map_err(|e| PredictorError::Session(Arc::new(e)))
                .and_then(|a| a);
            handle.join().expect("encoder thread never panics").ok();
            r
        }
        .boxed()
    }

    fn load_blocking(path: &Path, img: &DynamicImage) -> Result<Self, PredictorError> {
        let env = Arc::new(
            Environment::builder()
                .with_name("SAM")
                .build()?,
        );
        let encoder =
            SessionBuilder::new(&env)?.with_model_from_file(path.join("vit_t_encoder.onnx"))?;
        let decoder =
            SessionBuilder::new(&env)?.with_model_from_file(path.join("vit_t_decoder.onnx"))?;

        let input = prepare_image_input(img)?;
        let embeddings = {
            let input_as_values = &input.data.as_standard_layout();
            let encoder_inputs = vec![Value::from_array(encoder.allocator(), input_as_values)?];
            let outputs = encoder.run(encoder_inputs)?;
            outputs
                .first()
                .ok_or_else(|| {
                    PredictorError::UnexpectedOutput("encoder produced no output".into())
                })?
                .try_extract::<f32>()
                .map_err(|e| {
                    PredictorError::UnexpectedOutput(format!("expected f32 embeddings: {e:?}"))
                })?
                .view()
                .to_owned()
        };

        Ok(Self {
            decoder: Arc::new(decoder),
            embeddings: Arc::new(input.map(|_| embeddings)),
        })
    }

    fn spawn_decode(
        &self,
        coords: Vec<f32>,
        labels: Vec<f32>,
    ) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
        let decoder = Arc::clone(&self.decoder);
        let embeddings = Arc::clone(&self.embeddings);
        let (tx, rx) = futures::channel::oneshot::channel();
        let handle = std::thread::spawn(move || {
            tx.send(Self::decode_blocking(decoder, embeddings, coords, labels))
        });
        async move {
            let r = rx
                .await
                .map_err(|e| PredictorError::Session(Arc::new(e)))
                .and_then(|a| a);
            handle.join().expect("decoder thread never panics").ok();
            r
        }
        .boxed()
    }

    fn decode_blocking(
        decoder: Arc<Session>,
        embeddings: Arc<SamEmbeddings>,
        coords: Vec<f32>,
        labels: Vec<f32>,
    ) -> Result<Prediction, PredictorError> {
        let orig_width = embeddings.original_width.get() as f32;
        let orig_height = embeddings.original_height.get() as f32;
        let resized_width = embeddings.resized_width.get() as f32;
        let resized_height = embeddings.resized_height.get() as f32;

        // Prompt coordinates arrive in display space and must be mapped onto
        // the resized model input.
        let coords: Vec<f32> = coords
            .chunks_exact(2)
            .flat_map(|xy| {
                [
                    xy[0] * (resized_width / orig_width),
                    xy[1] * (resized_height / orig_height),
                ]
            })
            .collect();
        let count = labels.len();
        let point_coords = Array::from_shape_vec((1, count, 2), coords)
            .map_err(|e| PredictorError::UnexpectedOutput(format!("prompt shape: {e}")))?
            .into_dyn();
        let point_labels = Array::from_shape_vec((1, count), labels)
            .map_err(|e| PredictorError::UnexpectedOutput(format!("label shape: {e}")))?
            .into_dyn();

        // No previous-mask input on any call.
        let mask_input = Array::<f32, _>::zeros((1, 1, 256, 256)).into_dyn();
        let has_mask_input = ndarray::array![0.0_f32].into_dyn();
        let orig_im_size = ndarray::array![orig_height, orig_width].into_dyn();

        let embeddings_as_values = &embeddings.data.as_standard_layout();
        let point_coords_as_values = &point_coords.as_standard_layout();
        let point_labels_as_values = &point_labels.as_standard_layout();
        let mask_input_as_values = &mask_input.as_standard_layout();
        let has_mask_input_as_values = &has_mask_input.as_standard_layout();
        let orig_im_size_as_values = &orig_im_size.as_standard_layout();

        let decoder_inputs = vec![
            Value::from_array(decoder.allocator(), embeddings_as_values)?,
            Value::from_array(decoder.allocator(), point_coords_as_values)?,
            Value::from_array(decoder.allocator(), point_labels_as_values)?,
            Value::from_array(decoder.allocator(), mask_input_as_values)?,
            Value::from_array(decoder.allocator(), has_mask_input_as_values)?,
            Value::from_array(decoder.allocator(), orig_im_size_as_values)?,
        ];

        let outputs = decoder.run(decoder_inputs)?;
        debug!("decoder returned {} outputs", outputs.len());

        let masks_tensor = outputs
            .first()
            .ok_or_else(|| PredictorError::UnexpectedOutput("decoder produced no masks".into()))?
            .try_extract::<f32>()
            .map_err(|e| PredictorError::UnexpectedOutput(format!("expected f32 masks: {e:?}")))?;
        let view = masks_tensor.view();
        let shape = view.shape().to_vec();
        if shape.len() != 4 {
            return Err(PredictorError::UnexpectedOutput(format!(
                "mask tensor of rank {}, expected 4",
                shape.len()
            )));
        }
        let size = [shape[3], shape[2]];
        let mut masks = Vec::with_capacity(shape[1]);
        for candidate in 0..shape[1] {
            let scores = view.slice(s![0, candidate, .., ..]);
            let mask = mask_from_scores(scores.iter().copied(), size).ok_or_else(|| {
                PredictorError::UnexpectedOutput("mask candidate has wrong extent".into())
            })?;
            masks.push(mask);
        }

        let confidences = match outputs.get(1) {
            Some(value) => value
                .try_extract::<f32>()
                .map_err(|e| {
                    PredictorError::UnexpectedOutput(format!("expected f32 scores: {e:?}"))
                })?
                .view()
                .iter()
                .copied()
                .collect(),
            None => Vec::new(),
        };
        let logits = match outputs.get(2) {
            Some(value) => RawLogits::new(
                value
                    .try_extract::<f32>()
                    .map_err(|e| {
                        PredictorError::UnexpectedOutput(format!("expected f32 logits: {e:?}"))
                    })?
                    .view()
                    .iter()
                    .copied()
                    .collect(),
            ),
            None => RawLogits::default(),
        };

        Ok(Prediction {
            masks,
            confidences,
            logits,
        })
    }
}

impl Predictor for SamPredictor {
    fn predict(
        &self,
        points: &[Point],
        labels: &[Label],
    ) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
        let coords = points.iter().flat_map(|p| [p.x, p.y]).collect();
        let labels = labels
            .iter()
            .map(|l| match l {
                Label::Foreground => 1.0,
                Label::Background => 0.0,
            })
            .collect();
        self.spawn_decode(coords, labels)
    }

    fn predict_seed(&self, seed: Seed) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
        // SAM prompt conventions: a lone positive point is labeled 1, box
        // corners are labeled 2 (top-left) and 3 (bottom-right).
        let (coords, labels) = match seed {
            Seed::Centroid(p) => (vec![p.x, p.y], vec![1.0]),
            Seed::Box(b) => (vec![b.x1, b.y1, b.x2, b.y2], vec![2.0, 3.0]),
        };
        self.spawn_decode(coords, labels)
    }
}
