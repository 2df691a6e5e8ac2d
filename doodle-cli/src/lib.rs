//! # Doodle Moji CLI
//!
//! Operator command line for the doodle classifier: manage models, labels,
//! and samples, train, and recognize drawings stored as JSON.
//!
//! ## Usage
//!
//! ```bash
//! doodle --data-dir ./data models add "Faces" --activate
//! doodle samples add --emoji ⭐ --drawing star.json
//! doodle train
//! doodle recognize --drawing doodle.json --png input.png
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `CliConfig` - Data directory and classifier settings derived from the args
//! - `commands::run` - Executes one [`Command`] against a `DoodleEngine`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Default side length of the classifier input.
pub const DEFAULT_INPUT_SIZE: u32 = doodle_renderer::DEFAULT_INPUT_SIZE;

/// Command-line arguments for doodle.
#[derive(Debug, Clone, Parser)]
#[command(name = "doodle")]
#[command(about = "Train and run a personal doodle-to-emoji classifier")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding samples, models, and trained artifacts
    #[arg(long, env = "DOODLE_DATA_DIR", default_value = "doodle-data")]
    pub data_dir: PathBuf,

    /// Side length in pixels of the rasterized classifier input
    #[arg(long, env = "DOODLE_INPUT_SIZE", default_value_t = DEFAULT_INPUT_SIZE)]
    pub input_size: u32,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Manage models
    #[command(subcommand)]
    Models(ModelsCommand),

    /// List the labels of a model
    Labels {
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
    },

    /// Rename or remove a label
    #[command(subcommand)]
    Label(LabelCommand),

    /// Manage training samples
    #[command(subcommand)]
    Samples(SamplesCommand),

    /// Train a model from its samples
    Train {
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
    },

    /// Recognize a drawing
    Recognize {
        /// Path to the drawing JSON
        #[arg(long)]
        drawing: PathBuf,

        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,

        /// Also write the rasterized classifier input to this PNG
        #[arg(long)]
        png: Option<PathBuf>,
    },

    /// Show recent recognitions and per-emoji statistics
    History {
        /// Clear the history instead of showing it
        #[arg(long)]
        clear: bool,
    },

    /// Write a backup of all data to a file
    Export {
        /// Destination path
        path: PathBuf,
    },

    /// Replace all data with a backup file
    Import {
        /// Backup path
        path: PathBuf,
    },
}

/// `models` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum ModelsCommand {
    /// List models
    List,
    /// Create a model
    Add {
        /// Model name
        name: String,
        /// Make the new model active
        #[arg(long)]
        activate: bool,
    },
    /// Make a model the active one
    Activate {
        /// Model id or name
        model: String,
    },
    /// Delete a model with its samples, labels, and artifact
    Remove {
        /// Model id or name
        model: String,
    },
}

/// `label` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum LabelCommand {
    /// Set or clear a label's display name
    Rename {
        /// Emoji of the label
        emoji: String,
        /// New display name (omit to clear)
        name: Option<String>,
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Delete a label and every sample drawn for it
    Remove {
        /// Emoji of the label
        emoji: String,
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
    },
}

/// `samples` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum SamplesCommand {
    /// Add a labeled drawing
    Add {
        /// Emoji the drawing depicts
        #[arg(long)]
        emoji: String,
        /// Path to the drawing JSON
        #[arg(long)]
        drawing: PathBuf,
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
        /// Canvas width at capture time
        #[arg(long, default_value = "390")]
        canvas_width: f32,
        /// Canvas height at capture time
        #[arg(long, default_value = "390")]
        canvas_height: f32,
    },
    /// List the samples of a model
    List {
        /// Model id or name (defaults to the active model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Delete a sample
    Remove {
        /// Sample id
        id: String,
    },
}

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Data directory.
    pub data_dir: PathBuf,
    /// Classifier input side length.
    pub input_size: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("doodle-data"),
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        Self {
            data_dir: args.data_dir.clone(),
            input_size: args.input_size,
        }
    }
}
