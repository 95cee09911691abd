//! eigenfaces CLI: extracts the mean face and eigenfaces from a set of images.

use clap::{Parser, Subcommand};
use eigenfaces::pipeline::DEFAULT_OUTPUT_DIR;
use eigenfaces::{plot_eigenfaces, EigenfaceConfig, FileImageLoader};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::{Command, ExitCode};

/// Eigenface decomposition
#[derive(Debug, Parser)]
#[command(name = "eigenfaces", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract the mean face and eigenfaces from the images
    Extract {
        /// The image files to reduce
        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },
}

/// Root of the enclosing git repository, if any.
fn git_toplevel() -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let top = String::from_utf8(output.stdout).ok()?;
    let top = top.trim();
    (!top.is_empty()).then(|| PathBuf::from(top))
}

fn output_location() -> PathBuf {
    match git_toplevel() {
        Some(root) => root.join(DEFAULT_OUTPUT_DIR),
        None => {
            warn!("Not inside a git repository; writing relative to the working directory");
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        }
    }
}

/// Runs one extraction and maps the outcome to the process exit code.
fn run(files: &[PathBuf], output_dir: PathBuf) -> ExitCode {
    let config = EigenfaceConfig::default().with_output_dir(output_dir);
    match plot_eigenfaces(files, &FileImageLoader, &config) {
        Ok(written) => {
            info!(
                "Wrote mean face, {} eigenfaces, and model to {}",
                written.eigenfaces.len(),
                config.output_dir.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract { files } => run(&files, output_location()),
    }
}
