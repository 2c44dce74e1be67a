use anyhow::{Context, Result};
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use log::info;
use spritenet_core::{DatasetShape, HttpFetcher, RunArgs, RunConfig, Session, TrainingHistory};

type TrainingBackend = Autodiff<NdArray<f32>>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = RunArgs::parse_from_env()?;
    if args.help_requested() {
        print_usage();
        return Ok(());
    }

    let config = RunConfig::load(args.config_path())?;
    let report_options = args.report_options(config.report);
    let prediction_samples = config.prediction_samples;

    let fetcher = HttpFetcher::new(config.fetch_timeout()).context("failed to build HTTP client")?;
    let mut session = Session::<TrainingBackend>::load(
        config,
        DatasetShape::MNIST,
        NdArrayDevice::Cpu,
        &fetcher,
    )?;

    match session.train_or_restore(args.retrain())? {
        Some(history) => print_history(&history),
        None => info!("skipping training, using saved model"),
    }

    info!("predicting {} test samples", prediction_samples);
    let outcome = session.predict(prediction_samples)?;
    let summary = session.report(&outcome, report_options)?;

    for (name, preview) in &summary.previews {
        println!("{name}\n{preview}");
    }
    println!(
        "total predictions {}, total errors {}",
        summary.total, summary.errors
    );
    if !summary.written.is_empty() {
        println!(
            "wrote {} misclassified digits to {}",
            summary.written.len(),
            session.config().results_dir.display()
        );
    }

    Ok(())
}

fn print_usage() {
    println!(
        "Usage: cargo run -p spritenet-experiment-mnist -- [--config <path>] [--retrain] [--preview] [--no-disk]"
    );
}

fn print_history(history: &TrainingHistory) {
    if let Some(last) = history.last() {
        println!(
            "trained {} epochs in {:.3}s: train accuracy {:.2}%, val accuracy {:.2}%",
            last.epoch, history.duration_secs, last.train.accuracy, last.validation.accuracy
        );
    }
}
