use crate::Point;

/// Axis-aligned box prompt, corners in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        debug_assert!(x1 < x2 && y1 < y2);
        Self { x1, y1, x2, y2 }
    }
}

/// One whole-image prompt entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seed {
    Centroid(Point),
    Box(BoundingBox),
}

/// Precomputed seed locations for segmenting a whole image without
/// per-object clicking. Immutable once loaded, homogeneous by construction;
/// iteration order is load order and later entries win on overlap.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptBatch {
    Centroids(Vec<Point>),
    Boxes(Vec<BoundingBox>),
}

impl PromptBatch {
    pub fn len(&self) -> usize {
        match self {
            PromptBatch::Centroids(c) => c.len(),
            PromptBatch::Boxes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries in load order.
    pub fn seeds(&self) -> impl Iterator<Item = Seed> + '_ {
        let (centroids, boxes) = match self {
            PromptBatch::Centroids(c) => (Some(c), None),
            PromptBatch::Boxes(b) => (None, Some(b)),
        };
        centroids
            .into_iter()
            .flatten()
            .map(|&c| Seed::Centroid(c))
            .chain(boxes.into_iter().flatten().map(|&b| Seed::Box(b)))
    }
}
