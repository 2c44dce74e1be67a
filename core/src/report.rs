use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::visualization::{encode_luma_png, render_terminal_preview};

/// Where misclassified digits are rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub write_to_disk: bool,
    pub print_to_console: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            write_to_disk: true,
            print_to_console: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub errors: usize,
    pub written: Vec<PathBuf>,
    /// `(name, text rendering)` of each mismatch when printing to the console.
    pub previews: Vec<(String, String)>,
}

/// Hands out `pred-<p>-label-<t>` names, suffixing repeats with `_2`, `_3`, ...
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    seen: HashMap<String, usize>,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&mut self, prediction: usize, label: usize) -> String {
        let key = format!("pred-{prediction}-label-{label}");
        let count = self.seen.entry(key.clone()).or_insert(0);
        *count += 1;

        if *count == 1 {
            key
        } else {
            format!("{key}_{count}")
        }
    }
}

/// Compare predictions with true classes and render every mismatch.
///
/// `images` holds one `image_side * image_side` row per prediction. When
/// writing to disk, `results_dir` is wiped and recreated first.
pub fn report_misclassifications(
    results_dir: &Path,
    options: ReportOptions,
    images: &[f32],
    image_side: usize,
    predictions: &[usize],
    labels: &[usize],
) -> Result<ReportSummary> {
    if predictions.len() != labels.len() {
        return Err(anyhow!(
            "got {} predictions for {} labels",
            predictions.len(),
            labels.len()
        ));
    }
    let image_size = image_side * image_side;
    if images.len() != predictions.len() * image_size {
        return Err(anyhow!(
            "image buffer holds {} values, expected {} images of {}x{}",
            images.len(),
            predictions.len(),
            image_side,
            image_side
        ));
    }

    if options.write_to_disk {
        reset_dir(results_dir)?;
    }

    let mut namer = ArtifactNamer::new();
    let mut summary = ReportSummary {
        total: predictions.len(),
        ..ReportSummary::default()
    };

    for (i, (&prediction, &label)) in predictions.iter().zip(labels).enumerate() {
        if prediction == label {
            continue;
        }
        summary.errors += 1;

        let image = &images[i * image_size..(i + 1) * image_size];
        let name = namer.next_name(prediction, label);

        if options.write_to_disk {
            let path = results_dir.join(format!("{name}.png"));
            let png = encode_luma_png(image_side as u32, image_side as u32, image)?;
            fs::write(&path, png)
                .with_context(|| format!("failed to write {}", path.display()))?;
            debug!("wrote {}", path.display());
            summary.written.push(path);
        }

        if options.print_to_console {
            let preview = render_terminal_preview(image_side, image)?;
            summary.previews.push((name, preview));
        }
    }

    info!(
        "{} of {} predictions were wrong, {} artifacts written",
        summary.errors,
        summary.total,
        summary.written.len()
    );

    Ok(summary)
}

fn reset_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to clear {}", dir.display()));
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create directory {}", dir.display()))
}
