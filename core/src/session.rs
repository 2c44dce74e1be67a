use anyhow::{anyhow, Context, Result};
use burn::{module::AutodiffModule, tensor::backend::AutodiffBackend};
use log::info;
use rand::rngs::StdRng;

use crate::{
    batcher::{Batch, MnistData},
    cache::Fetcher,
    config::RunConfig,
    dataset::{DatasetShape, RawDataset},
    metrics::TrainingHistory,
    model::{self, Classifier, FitOptions},
    report::{report_misclassifications, ReportOptions, ReportSummary},
    rng::seeded_rng,
};

/// A test batch together with the predicted and true class of every row.
#[derive(Clone, Debug)]
pub struct PredictionOutcome {
    pub batch: Batch,
    pub predictions: Vec<usize>,
    pub labels: Vec<usize>,
}

impl PredictionOutcome {
    pub fn errors(&self) -> usize {
        self.predictions
            .iter()
            .zip(&self.labels)
            .filter(|(prediction, label)| prediction != label)
            .count()
    }
}

/// Owns the dataset, the model and the RNG for one run.
pub struct Session<B: AutodiffBackend> {
    config: RunConfig,
    device: B::Device,
    data: MnistData,
    rng: StdRng,
    model: Option<Classifier<B>>,
}

impl<B: AutodiffBackend> Session<B> {
    /// Fetch or read the cached dataset files, decode them and set up the batch cursors.
    pub fn load(
        config: RunConfig,
        shape: DatasetShape,
        device: B::Device,
        fetcher: &dyn Fetcher,
    ) -> Result<Self> {
        let cache = config.dataset_cache();
        let image_bytes = cache
            .load_images(fetcher)
            .context("failed to load the image sprite sheet")?;
        let label_bytes = cache
            .load_labels(fetcher)
            .context("failed to load the label blob")?;
        let raw = RawDataset::decode(&image_bytes, &label_bytes, shape)
            .context("failed to decode the dataset")?;

        Ok(Self::from_dataset(config, raw, device))
    }

    pub fn from_dataset(config: RunConfig, raw: RawDataset, device: B::Device) -> Self {
        let mut rng = seeded_rng(config.seed);
        let shape = *raw.shape();
        let data = MnistData::new(raw, &mut rng);
        info!(
            "dataset ready: {} train / {} test samples",
            shape.num_train,
            shape.num_test()
        );

        Self {
            config,
            device,
            data,
            rng,
            model: None,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn data(&self) -> &MnistData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut MnistData {
        &mut self.data
    }

    pub fn model(&self) -> Option<&Classifier<B>> {
        self.model.as_ref()
    }

    /// Restore the saved model, or train and save a new one.
    ///
    /// Returns the training history when a model was trained, `None` when it was restored.
    pub fn train_or_restore(&mut self, retrain: bool) -> Result<Option<TrainingHistory>> {
        let checkpoint_dir = &self.config.checkpoint_dir;

        if !retrain {
            if let Some(restored) = model::load::<B>(checkpoint_dir, &self.device)? {
                info!("restored model from {}", checkpoint_dir.display());
                if let Some(last) = model::load_history(checkpoint_dir)?
                    .as_ref()
                    .and_then(TrainingHistory::last)
                {
                    info!(
                        "checkpoint was trained for {} epochs, final val accuracy {:.2}%",
                        last.epoch, last.validation.accuracy
                    );
                }
                self.model = Some(restored);
                return Ok(None);
            }
        }

        B::seed(self.config.seed);
        let fresh = model::build::<B>(&self.device);
        let train = self.data.next_train_batch(self.config.train_samples)?;
        let validation = self.data.next_test_batch(self.config.validation_samples)?;

        info!(
            "training on {} samples for {} epochs",
            train.len(),
            self.config.epochs
        );
        let (trained, history) = model::fit(
            fresh,
            &train,
            &validation,
            &FitOptions::from(&self.config),
            &mut self.rng,
            &self.device,
        )?;

        model::save(&trained, checkpoint_dir)?;
        model::save_history(&history, checkpoint_dir)?;
        self.model = Some(trained);

        Ok(Some(history))
    }

    /// Draw `samples` test images and classify them.
    pub fn predict(&mut self, samples: usize) -> Result<PredictionOutcome> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("no model available; train or restore one first"))?;

        let batch = self.data.next_test_batch(samples)?;
        let predictions = model::predict(&model.valid(), &batch, &self.device)?;
        let labels = batch.classes();

        Ok(PredictionOutcome {
            batch,
            predictions,
            labels,
        })
    }

    pub fn report(&self, outcome: &PredictionOutcome, options: ReportOptions) -> Result<ReportSummary> {
        let side = self
            .data
            .shape()
            .image_side()
            .ok_or_else(|| anyhow!("images of {} pixels are not square", self.data.shape().image_size))?;

        report_misclassifications(
            &self.config.results_dir,
            options,
            outcome.batch.images(),
            side,
            &outcome.predictions,
            &outcome.labels,
        )
    }
}
