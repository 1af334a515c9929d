#[cfg(feature = "sam")]
fn main() -> eframe::Result<()> {
    use std::sync::Arc;

    use futures::FutureExt;
    use prompt_overlay::inference::SamPredictor;
    use prompt_overlay::Predictor;

    prompt_overlay::run_native(Box::new(|config, img| {
        SamPredictor::load(&config.sam_path, img)
            .map(|r| r.map(|p| Arc::new(p) as Arc<dyn Predictor>))
            .boxed()
    }))
}

#[cfg(not(feature = "sam"))]
fn main() {
    eprintln!("prompt-overlay was built without a model backend; rebuild with `--features sam`");
    std::process::exit(1);
}
