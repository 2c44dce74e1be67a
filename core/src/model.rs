use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, ensure, Context, Result};
use burn::{
    module::{AutodiffModule, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig,
    },
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        activation::{relu, softmax},
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor, TensorData,
    },
};
use log::{debug, info};
use rand::Rng;

use crate::{
    batcher::Batch,
    config::RunConfig,
    metrics::{EpochMetrics, EvaluationMetrics, TrainingHistory},
    rng::shuffled_indices,
};

pub const IMAGE_SIDE: usize = 28;
pub const NUM_CLASSES: usize = 10;
const HIDDEN_DIM: usize = 128;
// 16 channels of 4x4 after two conv(5x5) + pool(2x2) stages on 28x28
const FLATTENED_DIM: usize = 16 * 4 * 4;

const CHECKPOINT_NAME: &str = "model";
const HISTORY_NAME: &str = "history.json";

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// conv → pool → conv → pool → dense → dense digit classifier.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    /// Class logits for `[batch, 1, 28, 28]` images.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(relu(self.conv1.forward(images)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));
        let x = relu(self.hidden.forward(x.flatten::<2>(1, 3)));
        self.output.forward(x)
    }

    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }
}

/// A freshly initialized classifier.
pub fn build<B: Backend>(device: &B::Device) -> Classifier<B> {
    Classifier {
        conv1: Conv2dConfig::new([1, 8], [5, 5]).init(device),
        conv2: Conv2dConfig::new([8, 16], [5, 5]).init(device),
        pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        hidden: LinearConfig::new(FLATTENED_DIM, HIDDEN_DIM).init(device),
        output: LinearConfig::new(HIDDEN_DIM, NUM_CLASSES).init(device),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

impl From<&RunConfig> for FitOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            epochs: config.epochs,
            batch_size: config.fit_batch_size,
            learning_rate: config.learning_rate,
        }
    }
}

/// Train on `train` for the configured epochs, validating on `validation` after each one.
///
/// Sample order is reshuffled every epoch before slicing into mini-batches.
pub fn fit<B: AutodiffBackend, R: Rng + ?Sized>(
    mut model: Classifier<B>,
    train: &Batch,
    validation: &Batch,
    options: &FitOptions,
    rng: &mut R,
    device: &B::Device,
) -> Result<(Classifier<B>, TrainingHistory)> {
    ensure!(options.batch_size > 0, "fit batch size must be positive");
    ensure!(!train.is_empty(), "cannot fit on an empty batch");

    let mut optimizer = AdamConfig::new().init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let started = Instant::now();
    let mut history = TrainingHistory::default();

    for epoch in 1..=options.epochs {
        let order = shuffled_indices(train.len(), rng);
        let mut total_loss = 0.0;
        let mut total_correct = 0usize;

        for chunk in order.chunks(options.batch_size) {
            let mini = train.select(chunk);
            let images = images_tensor::<B>(&mini, device)?;
            let targets = targets_tensor::<B>(&mini, device);

            let logits = model.forward(images);
            let loss = loss_fn.forward(logits.clone(), targets.clone());
            total_correct += correct_count(logits, targets);
            total_loss += loss.clone().into_scalar().elem::<f32>() * chunk.len() as f32;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(options.learning_rate, model, grads);
        }

        let metrics = EpochMetrics {
            epoch,
            train: EvaluationMetrics {
                loss: total_loss / train.len() as f32,
                accuracy: total_correct as f32 / train.len() as f32 * 100.0,
            },
            validation: evaluate(&model.valid(), validation, device)?,
        };

        info!(
            "epoch {}/{}: loss {:.4}, accuracy {:.2}%, val loss {:.4}, val accuracy {:.2}%",
            epoch,
            options.epochs,
            metrics.train.loss,
            metrics.train.accuracy,
            metrics.validation.loss,
            metrics.validation.accuracy
        );
        history.epochs.push(metrics);
    }

    history.duration_secs = started.elapsed().as_secs_f64();
    info!("model training took {:.3}s", history.duration_secs);

    Ok((model, history))
}

/// Loss and accuracy on `batch` without touching the weights.
pub fn evaluate<B: Backend>(
    model: &Classifier<B>,
    batch: &Batch,
    device: &B::Device,
) -> Result<EvaluationMetrics> {
    if batch.is_empty() {
        return Ok(EvaluationMetrics::default());
    }

    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let targets = targets_tensor::<B>(batch, device);
    let logits = model.forward(images_tensor::<B>(batch, device)?);
    let loss = loss_fn.forward(logits.clone(), targets.clone());
    let correct = correct_count(logits, targets);

    Ok(EvaluationMetrics {
        loss: loss.into_scalar().elem::<f32>(),
        accuracy: correct as f32 / batch.len() as f32 * 100.0,
    })
}

/// Most probable class for every row of `batch`.
pub fn predict<B: Backend>(
    model: &Classifier<B>,
    batch: &Batch,
    device: &B::Device,
) -> Result<Vec<usize>> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let images = images_tensor::<B>(batch, device)?;
    let predictions = model
        .probabilities(images)
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| anyhow!("failed to decode predictions: {err:?}"))?;

    Ok(predictions.into_iter().map(|class| class as usize).collect())
}

pub fn checkpoint_path(dir: &Path) -> PathBuf {
    dir.join(CHECKPOINT_NAME).with_extension("mpk")
}

pub fn save<B: Backend>(model: &Classifier<B>, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    model
        .clone()
        .save_file(dir.join(CHECKPOINT_NAME), &CheckpointRecorder::new())
        .map_err(|err| anyhow!("failed to save checkpoint to {}: {err:?}", dir.display()))?;
    info!("saved model to {}", checkpoint_path(dir).display());
    Ok(())
}

/// Restore a checkpoint written by [`save`]; `None` if there is none at `dir`.
pub fn load<B: Backend>(dir: &Path, device: &B::Device) -> Result<Option<Classifier<B>>> {
    let path = checkpoint_path(dir);
    if !path.exists() {
        debug!("no checkpoint at {}", path.display());
        return Ok(None);
    }

    let model = build::<B>(device)
        .load_file(dir.join(CHECKPOINT_NAME), &CheckpointRecorder::new(), device)
        .map_err(|err| anyhow!("failed to load checkpoint {}: {err:?}", path.display()))?;
    Ok(Some(model))
}

pub fn save_history(history: &TrainingHistory, dir: &Path) -> Result<()> {
    let path = dir.join(HISTORY_NAME);
    let serialized = serde_json::to_string_pretty(history)?;
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write training history to {}", path.display()))
}

pub fn load_history(dir: &Path) -> Result<Option<TrainingHistory>> {
    let path = dir.join(HISTORY_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read training history from {}", path.display()))?;
    let history = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse training history at {}", path.display()))?;
    Ok(Some(history))
}

fn images_tensor<B: Backend>(batch: &Batch, device: &B::Device) -> Result<Tensor<B, 4>> {
    ensure!(
        batch.image_size() == IMAGE_SIDE * IMAGE_SIDE,
        "classifier expects {}x{} images, batch rows hold {} pixels",
        IMAGE_SIDE,
        IMAGE_SIDE,
        batch.image_size()
    );

    let data = TensorData::new(
        batch.images().to_vec(),
        [batch.len(), 1, IMAGE_SIDE, IMAGE_SIDE],
    );
    Ok(Tensor::<B, 4>::from_floats(data, device))
}

fn targets_tensor<B: Backend>(batch: &Batch, device: &B::Device) -> Tensor<B, 1, Int> {
    let classes: Vec<i64> = batch.classes().into_iter().map(|c| c as i64).collect();
    Tensor::<B, 1, Int>::from_ints(TensorData::new(classes, [batch.len()]), device)
}

fn correct_count<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    logits
        .argmax(1)
        .squeeze(1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}
