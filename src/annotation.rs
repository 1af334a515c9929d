use crate::{InteractionError, Mask, PromptBatch};

/// A position in the displayed image's pixel coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Foreground,
    Background,
}

/// Annotation data for one interactive session on one image.
///
/// Points and labels grow strictly in lockstep; the index pairing is what
/// ties a label to its click. The mask is `None` exactly when no prediction
/// succeeded since the last clear.
#[derive(Default)]
pub struct AnnotationState {
    points: Vec<Point>,
    labels: Vec<Label>,
    mask: Option<Mask>,
    prompt_batch: Option<PromptBatch>,
}

impl AnnotationState {
    pub fn add_point(&mut self, point: impl Into<Point>, label: Label) {
        self.points.push(point.into());
        self.labels.push(label);
    }

    /// Empties points, labels and the mask. A loaded prompt batch counts as
    /// configuration rather than annotation and survives.
    pub fn clear(&mut self) {
        self.points.clear();
        self.labels.clear();
        self.mask = None;
    }

    /// Replaces the stored mask in full. Results are never merged with a
    /// previous mask.
    pub fn set_mask(&mut self, mask: Mask) {
        self.mask = Some(mask);
    }

    /// Stores an immutable batch of whole-image prompt seeds.
    ///
    /// Rejected once interactive points exist, so batch and interactive
    /// prompts can never mix ambiguously within a session.
    pub fn load_prompt_batch(&mut self, batch: PromptBatch) -> Result<(), InteractionError> {
        if !self.points.is_empty() {
            return Err(InteractionError::InvalidState);
        }
        self.prompt_batch = Some(batch);
        Ok(())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn prompt_batch(&self) -> Option<&PromptBatch> {
        self.prompt_batch.as_ref()
    }
}
