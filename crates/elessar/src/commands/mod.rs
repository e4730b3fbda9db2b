//! Subcommand handlers and the context they share.

pub mod beacons;
pub mod bridge;
pub mod discover;
pub mod scan;
pub mod settings;

use std::path::PathBuf;

use tracing::warn;

use elessar_config::{DecodedState, SavedState, Settings};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Settings and paths resolved from global flags.
pub struct Context {
    pub settings: Settings,
    pub settings_path: PathBuf,
    pub state_path: PathBuf,
    pub output: OutputFormat,
    pub quiet: bool,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let settings_path = global
            .config
            .clone()
            .unwrap_or_else(elessar_config::config_path);
        let mut settings = elessar_config::load_settings_from(&settings_path)
            .map_err(|e| CliError::config(e, &settings_path))?;
        if let Some(state_file) = &global.state_file {
            settings.state_file = Some(state_file.clone());
        }
        let state_path = settings.state_path();

        Ok(Self {
            settings,
            settings_path,
            state_path,
            output: global.output.clone(),
            quiet: global.quiet,
        })
    }

    pub fn load_state(&self) -> Result<SavedState, CliError> {
        elessar_config::load_state(&self.state_path).map_err(|e| CliError::config(e, &self.state_path))
    }

    /// Load and decode, logging every skipped entry.
    pub fn load_decoded(&self) -> Result<DecodedState, CliError> {
        let decoded = self.load_state()?.decode();
        for rejected in &decoded.rejected {
            warn!(entry = %rejected, path = %self.state_path.display(), "skipping persisted entry");
        }
        Ok(decoded)
    }

    pub fn save_state(&self, state: &SavedState) -> Result<(), CliError> {
        elessar_config::save_state(&self.state_path, state)
            .map_err(|e| CliError::config(e, &self.state_path))
    }
}
