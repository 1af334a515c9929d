use std::{
    num::{NonZeroU32, TryFromIntError},
    sync::Arc,
};

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, ArrayBase, Dim, IxDyn, IxDynImpl, OwnedRepr};

use crate::{Mask, PredictorError};

mod native_ort;

pub use native_ort::SamPredictor;

pub type SamEmbeddings = ResizedImageData<Array<f32, IxDyn>>;
pub type SamInputData = ResizedImageData<ArrayBase<OwnedRepr<f32>, Dim<IxDynImpl>>>;

impl From<TryFromIntError> for PredictorError {
    fn from(value: TryFromIntError) -> Self {
        Self::Session(Arc::new(value))
    }
}

/// Tensor data plus the resize bookkeeping needed to map prompt coordinates
/// from the displayed image into model space.
#[derive(Debug)]
pub struct ResizedImageData<T> {
    data: T,
    original_width: NonZeroU32,
    original_height: NonZeroU32,
    resized_width: NonZeroU32,
    resized_height: NonZeroU32,
}

impl<T> ResizedImageData<T> {
    pub fn map<TNew>(self, f: impl FnOnce(T) -> TNew) -> ResizedImageData<TNew> {
        ResizedImageData {
            data: (f)(self.data),
            original_width: self.original_width,
            original_height: self.original_height,
            resized_width: self.resized_width,
            resized_height: self.resized_height,
        }
    }
}

/// Resizes to the 1024px SAM input, normalizing each channel by its own
/// mean and standard deviation.
fn prepare_image_input(img: &DynamicImage) -> Result<SamInputData, PredictorError> {
    let (original_width, original_height) = img.dimensions();
    let (original_width, original_height) = (
        NonZeroU32::try_from(original_width)?,
        NonZeroU32::try_from(original_height)?,
    );
    let resized = img.resize(1024, 1024, FilterType::CatmullRom).to_rgb8();
    let (resized_width, resized_height) = resized.dimensions();
    let (resized_width, resized_height) = (
        NonZeroU32::try_from(resized_width)?,
        NonZeroU32::try_from(resized_height)?,
    );

    let mut stats: [rolling_stats::Stats<f32>; 3] =
        std::array::from_fn(|_| rolling_stats::Stats::new());
    for pixel in resized.pixels() {
        for (s, &v) in stats.iter_mut().zip(pixel.0.iter()) {
            s.update(v as f32);
        }
    }

    let mut input = Array::zeros((1, 3, 1024, 1024));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (channel, (&v, s)) in pixel.0.iter().zip(&stats).enumerate() {
            input[[0, channel, y as usize, x as usize]] = (v as f32 - s.mean) / s.std_dev;
        }
    }

    Ok(ResizedImageData {
        data: input.into_dyn(),
        original_width,
        original_height,
        resized_width,
        resized_height,
    })
}

/// Thresholds raw mask scores into a binary [`Mask`]; positive means
/// selected, everything else stays background.
fn mask_from_scores(scores: impl Iterator<Item = f32>, size: [usize; 2]) -> Option<Mask> {
    let data: Vec<u32> = scores.map(|v| (v > 0.0) as u32).collect();
    Mask::from_raw(size, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_threshold_at_zero() {
        let mask = mask_from_scores([-1.0, 0.0, 0.5, 3.0].into_iter(), [2, 2]).unwrap();
        assert_eq!(mask.data(), &[0, 0, 1, 1]);
    }

    #[test]
    fn wrong_score_count_is_rejected() {
        assert!(mask_from_scores([1.0; 3].into_iter(), [2, 2]).is_none());
    }
}
