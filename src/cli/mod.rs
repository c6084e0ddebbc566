// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use anyhow::Result;
use std::path::PathBuf;

use streamscout::config::Config;

pub mod check;
pub mod scrape;

pub use check::CheckConfigCommand;
pub use scrape::ScrapeCommand;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid format: {}. Use 'text' or 'json'", s),
        }
    }
}

/// Context for command execution
pub struct CommandContext {
    pub config_path: PathBuf,
}

impl CommandContext {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(&self.config_path)?)
    }
}
