use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use vibecast::{cache::ViewPaths, prelude::*};

#[derive(Parser, Debug)]
#[command(version, about = "Unwarp downward facing fisheye captures", long_about = None)]
struct Args {
    /// TOML configuration file. Falls back to $VIBECAST_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List raw captures in a time range as JSON
    List {
        #[arg(long)]
        from_date: String,
        #[arg(long)]
        to_date: String,
        #[arg(long, default_value = "00:00")]
        from_time: String,
        #[arg(long, default_value = "23:59")]
        to_time: String,
    },

    /// Per day capture counts of the whole upload tree as JSON
    Stats,

    /// Make sure the five views of each capture are cached
    Unwarp {
        /// Capture paths, absolute or relative to the uploads dir
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Write the five views of any image, bypassing the cache
    Render {
        input: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize, Default)]
struct UnwarpReport {
    unwarped: BTreeMap<String, ViewPaths>,
    errors: BTreeMap<String, String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("loading configuration")?;

    match args.command {
        Command::List {
            from_date,
            to_date,
            from_time,
            to_time,
        } => cmd_list(&config, &from_date, &to_date, &from_time, &to_time),
        Command::Stats => {
            let stats = capture_stats(&config.uploads_dir)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        Command::Unwarp { paths } => cmd_unwarp(&config, &paths),
        Command::Render { input, output_dir } => cmd_render(&config, &input, &output_dir),
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn cmd_list(
    config: &Config,
    from_date: &str,
    to_date: &str,
    from_time: &str,
    to_time: &str,
) -> Result<()> {
    let range = TimeRange::from_strings(from_date, to_date, from_time, to_time)?;
    let captures = list_captures(&config.uploads_dir, &range)?;
    println!("{}", serde_json::to_string_pretty(&captures)?);
    Ok(())
}

fn cmd_unwarp(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let cache = UnwarpCache::new(&config.unwarped_dir, config.generator()?)
        .with_jpeg_quality(config.jpeg_quality);

    let sources: Vec<PathBuf> = paths
        .iter()
        .map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                config.uploads_dir.join(path)
            }
        })
        .collect();

    let mut report = UnwarpReport::default();
    for ((source, result), requested) in cache.ensure_many(&sources).into_iter().zip(paths) {
        match result {
            Ok(unwarped) => {
                let rel = unwarped.relative_to(&config.data_dir);
                report.unwarped.insert(unwarped.timestamp, rel);
            }
            Err(err) => {
                log::debug!("{} failed: {err}", source.display());
                report
                    .errors
                    .insert(requested.display().to_string(), err.to_string());
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_render(config: &Config, input: &Path, output_dir: &Path) -> Result<()> {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| anyhow!("{} has no file name", input.display()))?;

    let frame = FisheyeFrame::open(input)?;
    let views = config.generator()?.generate(&frame)?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    for (direction, view) in views.iter() {
        let path = output_dir.join(format!("{stem}_{}.jpg", direction.code()));
        let bytes = encode_jpeg(view, config.jpeg_quality)?;
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("{direction}: {}", path.display());
    }

    Ok(())
}
