use std::sync::Arc;

use futures::FutureExt;
use log::debug;

use crate::{
    annotation::{AnnotationState, Label},
    async_task::AsyncTask,
    mask::{Mask, MaskStyle},
    predictor::{Predictor, PredictorError},
    prompt::{PromptBatch, Seed},
    surface::{PointerButton, PointerPress, Surface},
};

/// Marker tints, matching the palette of the matplotlib-era tool this
/// replaces (tab:blue for foreground, tab:red for background).
pub const FOREGROUND_MARKER: [u8; 3] = [31, 119, 180];
pub const BACKGROUND_MARKER: [u8; 3] = [214, 39, 40];

/// Batch entries at or below this confidence contribute nothing to the
/// combined mask.
pub const ACCEPT_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No mask is displayed.
    Idle,
    /// The last prediction succeeded and its mask is displayed.
    MaskReady,
    /// A predictor call is in flight.
    Predicting,
}

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("a prompt batch must be loaded before interactive points are placed")]
    InvalidState,

    #[error("prediction requires at least one point")]
    InsufficientPrompt,

    #[error("batched prediction requires a loaded prompt batch")]
    MissingPromptBatch,

    #[error("prediction failed: {0}")]
    PredictionFailed(#[from] PredictorError),
}

/// Binds surface input to annotation mutations and predictor calls.
///
/// Runs on one logical thread: events and prediction completions are handled
/// strictly one at a time, and `poll` is the only place a finished prediction
/// touches the state or the surface. All errors are recoverable; the machine
/// always lands back in `Idle` or `MaskReady`.
pub struct InteractionController {
    state: AnnotationState,
    predictor: Arc<dyn Predictor>,
    image_size: [usize; 2],
    mask_style: MaskStyle,
    pending: Option<AsyncTask<Result<Mask, PredictorError>>>,
}

impl InteractionController {
    /// `image_size` is `[width, height]` of the displayed image; batched
    /// predictions composite into a mask of that extent.
    pub fn new(
        predictor: Arc<dyn Predictor>,
        image_size: [usize; 2],
        mask_style: MaskStyle,
    ) -> Self {
        Self {
            state: AnnotationState::default(),
            predictor,
            image_size,
            mask_style,
            pending: None,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.pending.is_some() {
            Phase::Predicting
        } else if self.state.mask().is_some() {
            Phase::MaskReady
        } else {
            Phase::Idle
        }
    }

    pub fn state(&self) -> &AnnotationState {
        &self.state
    }

    pub fn load_prompt_batch(&mut self, batch: PromptBatch) -> Result<(), InteractionError> {
        self.state.load_prompt_batch(batch)
    }

    /// An in-bounds press appends a point labeled by button identity and
    /// drops a marker; presses outside the drawable are ignored. Accepted in
    /// every phase — points placed while a prediction is in flight simply
    /// extend the prompt used by the next one.
    pub fn handle_pointer_press(&mut self, press: PointerPress, surface: &mut dyn Surface) {
        let Some(pos) = press.pos else {
            return;
        };
        let (label, color) = match press.button {
            PointerButton::Primary => (Label::Foreground, FOREGROUND_MARKER),
            PointerButton::Secondary => (Label::Background, BACKGROUND_MARKER),
        };
        self.state.add_point(pos, label);
        surface.draw_marker(pos, color);
        surface.request_redraw();
    }

    /// Key identities: `"predict"`, `"predict-all"` and `"clear"`. Anything
    /// else is ignored.
    pub fn handle_key(
        &mut self,
        key: &str,
        surface: &mut dyn Surface,
    ) -> Result<(), InteractionError> {
        match key {
            "predict" => self.start_predict(),
            "predict-all" => self.start_predict_all(),
            "clear" => {
                self.clear(surface);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Drives an in-flight prediction forward; call once per event-loop turn.
    ///
    /// On completion the previous overlay is removed before the new mask is
    /// drawn, so repeated predictions never stack translucent layers. On
    /// failure the machine rolls back to wherever it was before the call.
    pub fn poll(&mut self, surface: &mut dyn Surface) -> Result<(), InteractionError> {
        let Some(task) = &mut self.pending else {
            return Ok(());
        };
        let Some(result) = task.data() else {
            return Ok(());
        };
        self.pending = None;
        let mask = result?;
        surface.clear_overlay();
        surface.draw_overlay(&mask);
        surface.request_redraw();
        self.state.set_mask(mask);
        Ok(())
    }

    fn start_predict(&mut self) -> Result<(), InteractionError> {
        if self.pending.is_some() {
            debug!("predict ignored, a prediction is already in flight");
            return Ok(());
        }
        if self.state.points().is_empty() {
            return Err(InteractionError::InsufficientPrompt);
        }
        let call = self.predictor.predict(self.state.points(), self.state.labels());
        self.pending = Some(AsyncTask::new(
            async move {
                let prediction = call.await?;
                let (mask, _) = prediction
                    .best()
                    .ok_or_else(|| PredictorError::UnexpectedOutput("no mask candidates".into()))?;
                Ok(mask.clone())
            }
            .boxed(),
        ));
        Ok(())
    }

    fn start_predict_all(&mut self) -> Result<(), InteractionError> {
        if self.pending.is_some() {
            debug!("predict-all ignored, a prediction is already in flight");
            return Ok(());
        }
        let batch = self
            .state
            .prompt_batch()
            .ok_or(InteractionError::MissingPromptBatch)?;
        let seeds: Vec<Seed> = batch.seeds().collect();
        let predictor = Arc::clone(&self.predictor);
        let size = self.image_size;
        let style = self.mask_style;
        self.pending = Some(AsyncTask::new(
            async move {
                let mut combined = Mask::zeros(size);
                for (index, seed) in seeds.into_iter().enumerate() {
                    let prediction = predictor.predict_seed(seed).await?;
                    let Some((mask, confidence)) = prediction.best() else {
                        continue;
                    };
                    if confidence.is_some_and(|c| c <= ACCEPT_CONFIDENCE) {
                        continue;
                    }
                    let id = match style {
                        MaskStyle::Binary => 1,
                        MaskStyle::Instance => index as u32 + 1,
                    };
                    combined.commit(mask, id);
                }
                Ok(combined)
            }
            .boxed(),
        ));
        Ok(())
    }

    fn clear(&mut self, surface: &mut dyn Surface) {
        // There is no mid-flight cancellation; dropping the task discards the
        // completion, so a cleared state can never be overwritten by it.
        self.pending = None;
        self.state.clear();
        surface.clear_markers();
        surface.clear_overlay();
        surface.request_redraw();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::channel::oneshot;
    use futures::future::BoxFuture;

    use super::*;
    use crate::{Point, Prediction, RawLogits};

    #[derive(Debug, PartialEq)]
    enum SurfaceOp {
        Marker(Point, [u8; 3]),
        Overlay(Mask),
        ClearMarkers,
        ClearOverlay,
        Redraw,
    }

    #[derive(Default)]
    struct RecordingSurface {
        ops: Vec<SurfaceOp>,
        markers: usize,
        overlay: Option<Mask>,
    }

    impl Surface for RecordingSurface {
        fn draw_marker(&mut self, at: Point, color: [u8; 3]) {
            self.markers += 1;
            self.ops.push(SurfaceOp::Marker(at, color));
        }

        fn draw_overlay(&mut self, mask: &Mask) {
            self.overlay = Some(mask.clone());
            self.ops.push(SurfaceOp::Overlay(mask.clone()));
        }

        fn clear_markers(&mut self) {
            self.markers = 0;
            self.ops.push(SurfaceOp::ClearMarkers);
        }

        fn clear_overlay(&mut self) {
            self.overlay = None;
            self.ops.push(SurfaceOp::ClearOverlay);
        }

        fn request_redraw(&mut self) {
            self.ops.push(SurfaceOp::Redraw);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Interactive(Vec<Point>, Vec<Label>),
        Seeded(Seed),
    }

    enum Reply {
        Now(Result<Prediction, PredictorError>),
        Wait(oneshot::Receiver<Result<Prediction, PredictorError>>),
    }

    /// Pops one scripted reply per call and records the arguments.
    #[derive(Default)]
    struct ScriptedPredictor {
        calls: Mutex<Vec<Call>>,
        replies: Mutex<VecDeque<Reply>>,
    }

    impl ScriptedPredictor {
        fn next_reply(&self) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("a reply is scripted for every call");
            match reply {
                Reply::Now(r) => std::future::ready(r).boxed(),
                Reply::Wait(rx) => async move { rx.await.expect("sender kept alive") }.boxed(),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Predictor for ScriptedPredictor {
        fn predict(
            &self,
            points: &[Point],
            labels: &[Label],
        ) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Interactive(points.to_vec(), labels.to_vec()));
            self.next_reply()
        }

        fn predict_seed(
            &self,
            seed: Seed,
        ) -> BoxFuture<'static, Result<Prediction, PredictorError>> {
            self.calls.lock().unwrap().push(Call::Seeded(seed));
            self.next_reply()
        }
    }

    fn mask_with(pixels: &[(usize, usize)]) -> Mask {
        let mut data = vec![0; 16];
        for &(x, y) in pixels {
            data[y * 4 + x] = 1;
        }
        Mask::from_raw([4, 4], data).unwrap()
    }

    fn prediction(mask: Mask, confidence: f32) -> Prediction {
        Prediction {
            masks: vec![mask],
            confidences: vec![confidence],
            logits: RawLogits::default(),
        }
    }

    fn controller(
        replies: Vec<Reply>,
        mask_style: MaskStyle,
    ) -> (InteractionController, Arc<ScriptedPredictor>) {
        let predictor = Arc::new(ScriptedPredictor {
            calls: Mutex::new(vec![]),
            replies: Mutex::new(replies.into()),
        });
        (
            InteractionController::new(predictor.clone(), [4, 4], mask_style),
            predictor,
        )
    }

    fn press(x: f32, y: f32, button: PointerButton) -> PointerPress {
        PointerPress {
            button,
            pos: Some(Point { x, y }),
        }
    }

    #[test]
    fn predict_without_points_is_rejected_before_the_predictor() {
        let (mut c, predictor) = controller(vec![], MaskStyle::Binary);
        let mut surface = RecordingSurface::default();

        let result = c.handle_key("predict", &mut surface);

        assert!(matches!(result, Err(InteractionError::InsufficientPrompt)));
        assert!(predictor.calls().is_empty());
        assert_eq!(c.phase(), Phase::Idle);
    }

    #[test]
    fn predict_all_without_batch_is_rejected_before_the_predictor() {
        let (mut c, predictor) = controller(vec![], MaskStyle::Binary);
        let mut surface = RecordingSurface::default();

        let result = c.handle_key("predict-all", &mut surface);

        assert!(matches!(result, Err(InteractionError::MissingPromptBatch)));
        assert!(predictor.calls().is_empty());
        assert_eq!(c.phase(), Phase::Idle);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (mut c, predictor) = controller(vec![], MaskStyle::Binary);
        let mut surface = RecordingSurface::default();
        c.handle_key("save", &mut surface).unwrap();
        assert!(predictor.calls().is_empty());
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn out_of_bounds_press_is_ignored() {
        let (mut c, _) = controller(vec![], MaskStyle::Binary);
        let mut surface = RecordingSurface::default();
        c.handle_pointer_press(
            PointerPress {
                button: PointerButton::Primary,
                pos: None,
            },
            &mut surface,
        );
        assert!(c.state().points().is_empty());
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn interactive_prediction_end_to_end() {
        let expected = mask_with(&[(1, 1), (2, 1)]);
        let (mut c, predictor) = controller(
            vec![Reply::Now(Ok(prediction(expected.clone(), 0.97)))],
            MaskStyle::Binary,
        );
        let mut surface = RecordingSurface::default();

        c.handle_pointer_press(press(10.0, 20.0, PointerButton::Primary), &mut surface);
        c.handle_pointer_press(press(5.0, 5.0, PointerButton::Secondary), &mut surface);
        assert_eq!(surface.markers, 2);
        assert_eq!(
            surface.ops[0],
            SurfaceOp::Marker(Point { x: 10.0, y: 20.0 }, FOREGROUND_MARKER)
        );

        c.handle_key("predict", &mut surface).unwrap();
        assert_eq!(c.phase(), Phase::Predicting);

        c.poll(&mut surface).unwrap();
        assert_eq!(c.phase(), Phase::MaskReady);
        assert_eq!(c.state().mask(), Some(&expected));
        assert_eq!(surface.overlay, Some(expected));
        assert_eq!(
            predictor.calls(),
            vec![Call::Interactive(
                vec![Point { x: 10.0, y: 20.0 }, Point { x: 5.0, y: 5.0 }],
                vec![Label::Foreground, Label::Background],
            )]
        );
    }

    #[test]
    fn clear_returns_to_idle_and_empties_the_surface() {
        let (mut c, _) = controller(
            vec![Reply::Now(Ok(prediction(mask_with(&[(0, 0)]), 0.95)))],
            MaskStyle::Binary,
        );
        let mut surface = RecordingSurface::default();
        c.handle_pointer_press(press(1.0, 1.0, PointerButton::Primary), &mut surface);
        c.handle_key("predict", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();
        assert_eq!(c.phase(), Phase::MaskReady);

        c.handle_key("clear", &mut surface).unwrap();

        assert_eq!(c.phase(), Phase::Idle);
        assert!(c.state().mask().is_none());
        assert!(c.state().points().is_empty());
        assert_eq!(surface.markers, 0);
        assert!(surface.overlay.is_none());
    }

    #[test]
    fn batched_prediction_gates_on_confidence() {
        let accepted = mask_with(&[(0, 0), (1, 0)]);
        let rejected = mask_with(&[(3, 3)]);
        let (mut c, predictor) = controller(
            vec![
                Reply::Now(Ok(prediction(accepted, 0.95))),
                Reply::Now(Ok(prediction(rejected, 0.5))),
            ],
            MaskStyle::Instance,
        );
        c.load_prompt_batch(PromptBatch::Centroids(vec![
            (0.0, 0.0).into(),
            (3.0, 3.0).into(),
        ]))
        .unwrap();
        let mut surface = RecordingSurface::default();

        c.handle_key("predict-all", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();

        assert_eq!(c.phase(), Phase::MaskReady);
        let combined = c.state().mask().unwrap();
        assert_eq!(combined.get(0, 0), 1);
        assert_eq!(combined.get(1, 0), 1);
        assert_eq!(combined.get(3, 3), 0);
        assert_eq!(
            predictor.calls(),
            vec![
                Call::Seeded(Seed::Centroid(Point { x: 0.0, y: 0.0 })),
                Call::Seeded(Seed::Centroid(Point { x: 3.0, y: 3.0 })),
            ]
        );
    }

    #[test]
    fn batched_prediction_is_last_write_wins() {
        let first = mask_with(&[(0, 0), (1, 1)]);
        let second = mask_with(&[(1, 1), (2, 2)]);
        let (mut c, _) = controller(
            vec![
                Reply::Now(Ok(prediction(first, 0.99))),
                Reply::Now(Ok(prediction(second, 0.99))),
            ],
            MaskStyle::Instance,
        );
        c.load_prompt_batch(PromptBatch::Centroids(vec![
            (0.0, 0.0).into(),
            (2.0, 2.0).into(),
        ]))
        .unwrap();
        let mut surface = RecordingSurface::default();

        c.handle_key("predict-all", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();

        let combined = c.state().mask().unwrap();
        assert_eq!(combined.get(0, 0), 1);
        assert_eq!(combined.get(1, 1), 2);
        assert_eq!(combined.get(2, 2), 2);
    }

    #[test]
    fn reentrant_predict_never_issues_a_second_call() {
        let (tx, rx) = oneshot::channel();
        let finished = mask_with(&[(0, 1)]);
        let (mut c, predictor) = controller(vec![Reply::Wait(rx)], MaskStyle::Binary);
        let mut surface = RecordingSurface::default();

        c.handle_pointer_press(press(1.0, 2.0, PointerButton::Primary), &mut surface);
        c.handle_key("predict", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();
        assert_eq!(c.phase(), Phase::Predicting);

        // Collapsed to a no-op while the first call is outstanding.
        c.handle_key("predict", &mut surface).unwrap();
        assert_eq!(predictor.calls().len(), 1);
        assert_eq!(c.phase(), Phase::Predicting);

        // Clicks are still accepted and extend the next prompt.
        c.handle_pointer_press(press(3.0, 4.0, PointerButton::Secondary), &mut surface);
        assert_eq!(c.state().points().len(), 2);

        tx.send(Ok(prediction(finished.clone(), 0.96))).unwrap();
        c.poll(&mut surface).unwrap();
        assert_eq!(c.phase(), Phase::MaskReady);
        assert_eq!(c.state().mask(), Some(&finished));
    }

    #[test]
    fn failed_prediction_rolls_back_to_idle() {
        let (mut c, _) = controller(
            vec![Reply::Now(Err(PredictorError::UnexpectedOutput(
                "decoder died".into(),
            )))],
            MaskStyle::Binary,
        );
        let mut surface = RecordingSurface::default();
        c.handle_pointer_press(press(1.0, 1.0, PointerButton::Primary), &mut surface);
        c.handle_key("predict", &mut surface).unwrap();

        let result = c.poll(&mut surface);

        assert!(matches!(
            result,
            Err(InteractionError::PredictionFailed(_))
        ));
        assert_eq!(c.phase(), Phase::Idle);
        assert!(surface.overlay.is_none());
    }

    #[test]
    fn failed_prediction_rolls_back_to_mask_ready() {
        let kept = mask_with(&[(2, 0)]);
        let (mut c, _) = controller(
            vec![
                Reply::Now(Ok(prediction(kept.clone(), 0.93))),
                Reply::Now(Err(PredictorError::UnexpectedOutput("transient".into()))),
            ],
            MaskStyle::Binary,
        );
        let mut surface = RecordingSurface::default();
        c.handle_pointer_press(press(1.0, 1.0, PointerButton::Primary), &mut surface);
        c.handle_key("predict", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();

        c.handle_key("predict", &mut surface).unwrap();
        assert!(c.poll(&mut surface).is_err());

        assert_eq!(c.phase(), Phase::MaskReady);
        assert_eq!(c.state().mask(), Some(&kept));
    }

    #[test]
    fn overlay_is_replaced_not_stacked() {
        let first = mask_with(&[(0, 0)]);
        let second = mask_with(&[(1, 0)]);
        let (mut c, _) = controller(
            vec![
                Reply::Now(Ok(prediction(first, 0.95))),
                Reply::Now(Ok(prediction(second.clone(), 0.95))),
            ],
            MaskStyle::Binary,
        );
        let mut surface = RecordingSurface::default();
        c.handle_pointer_press(press(0.0, 0.0, PointerButton::Primary), &mut surface);
        c.handle_key("predict", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();
        c.handle_key("predict", &mut surface).unwrap();
        c.poll(&mut surface).unwrap();

        // Every overlay draw is preceded by a removal of the previous one.
        let draws: Vec<_> = surface
            .ops
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Overlay(_) | SurfaceOp::ClearOverlay))
            .collect();
        assert_eq!(draws.len(), 4);
        assert!(matches!(draws[0], SurfaceOp::ClearOverlay));
        assert!(matches!(draws[2], SurfaceOp::ClearOverlay));
        assert_eq!(surface.overlay, Some(second));
    }
}
