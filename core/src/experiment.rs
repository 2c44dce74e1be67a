use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Result};

use crate::report::ReportOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Command-line overrides for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArgs {
    config_path: PathBuf,
    retrain: bool,
    preview: bool,
    no_disk: bool,
    help_requested: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            retrain: false,
            preview: false,
            no_disk: false,
            help_requested: false,
        }
    }
}

impl RunArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            if arg == "--config" || arg == "-c" {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("expected value after {}", arg))?;
                parsed.config_path = PathBuf::from(value);
            } else if let Some(value) = arg.strip_prefix("--config=") {
                parsed.config_path = PathBuf::from(value);
            } else if arg == "--retrain" {
                parsed.retrain = true;
            } else if arg == "--preview" {
                parsed.preview = true;
            } else if arg == "--no-disk" {
                parsed.no_disk = true;
            } else if arg == "--help" || arg == "-h" {
                parsed.help_requested = true;
            } else {
                return Err(anyhow!("unexpected argument: {}", arg));
            }
        }

        Ok(parsed)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn retrain(&self) -> bool {
        self.retrain
    }

    pub fn help_requested(&self) -> bool {
        self.help_requested
    }

    /// Apply `--preview` / `--no-disk` on top of the configured report options.
    pub fn report_options(&self, configured: ReportOptions) -> ReportOptions {
        ReportOptions {
            write_to_disk: configured.write_to_disk && !self.no_disk,
            print_to_console: configured.print_to_console || self.preview,
        }
    }
}
