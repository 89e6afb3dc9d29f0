//! A thin CLI wrapper over `spm_mosaic`'s public API, for scripted or batch
//! use outside of a GUI collaborator. All the real work happens in the
//! library; this binary only parses arguments and reports results.

use std::error::Error as StdError;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use spm_mosaic::prelude::*;

#[derive(Parser)]
#[command(name = "spm-mosaic", about = "Reconstruct an SPM mosaic from overlapping stage-offset tiles")]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, flatten, align, and composite tiles, reporting the resulting
    /// mosaic's dimensions and value range without writing an output file.
    Preview {
        #[arg(long, num_args = 1.., required = true)]
        tiles: Vec<PathBuf>,

        #[arg(long, num_args = 1.., required = true)]
        labels: Vec<String>,
    },

    /// Run the full pipeline and write a new SPM file, reusing `template`'s
    /// header layout for every field the stitched channel doesn't change.
    Stitch {
        #[arg(long, num_args = 1.., required = true)]
        tiles: Vec<PathBuf>,

        #[arg(long, num_args = 1.., required = true)]
        labels: Vec<String>,

        #[arg(long)]
        template: PathBuf,

        #[arg(long)]
        label: String,

        #[arg(long)]
        out: PathBuf,
    },
}

fn load_all(paths: &[PathBuf], labels: &[String]) -> Result<Vec<Tile>> {
    paths.iter().zip(labels.iter())
        .map(|(path, label)| {
            let mut tile = load_tile(path, label)?;
            flatten(&mut tile);
            Ok(tile)
        })
        .collect()
}

fn run(opts: Opts) -> Result<()> {
    match opts.command {
        Command::Preview { tiles, labels } => {
            let loaded = load_all(&tiles, &labels)?;
            let mosaic = preview(&loaded)?;

            let mut min_v = f64::INFINITY;
            let mut max_v = f64::NEG_INFINITY;
            for row in 0 .. mosaic.height {
                for col in 0 .. mosaic.width {
                    if let Some(value) = mosaic.get(row, col) {
                        min_v = min_v.min(value);
                        max_v = max_v.max(value);
                    }
                }
            }

            println!("mosaic: {}x{}, value range [{:.6}, {:.6}]", mosaic.width, mosaic.height, min_v, max_v);
            Ok(())
        }

        Command::Stitch { tiles, labels, template, label, out } => {
            let loaded = load_all(&tiles, &labels)?;
            save(&loaded, &template, &out, &label)?;
            println!("wrote {}", out.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let opts = Opts::parse();

    match run(opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log::error!("{}", error);
            eprintln!("error: {}", &error as &dyn StdError);
            ExitCode::FAILURE
        }
    }
}
