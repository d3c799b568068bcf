// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{crate_version, Args, Parser, Subcommand};
use mscz_highlight::{
    config::{Profiles, Settings},
    convert::{default_output, Converter},
    highlight::HighlightOptions,
    package::{check_package_path, ScorePackage},
    render::MuseScore,
    score::list_parts,
    util::filename_display,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Renders MuseScore scores to audio with one voice part brought to the front."
)]
struct Cli {
    /// The path to a YAML settings file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args, Default)]
struct HighlightArgs {
    /// The volume boost in dB for the highlighted voice.
    #[arg(long, allow_hyphen_values = true)]
    volume_boost: Option<i32>,
    /// The volume of every other part.
    #[arg(long, allow_hyphen_values = true)]
    master_volume: Option<i32>,
    /// Converts the other vocal parts to choir voices.
    #[arg(long)]
    choir: bool,
}

#[derive(Args, Default)]
struct RenderArgs {
    /// The MuseScore executable name or path.
    #[arg(long)]
    musescore_path: Option<String>,
    /// The render timeout, e.g. 90s or 10m.
    #[arg(long)]
    render_timeout: Option<String>,
    /// The extension, and so the format, of rendered files.
    #[arg(short = 'f', long)]
    format: Option<String>,
    /// Keeps temporary files for debugging.
    #[arg(long)]
    keep_temp: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts a score to audio, optionally highlighting one voice group.
    Convert {
        /// The score package (.mscz) to convert.
        input: PathBuf,
        /// The output file. Defaults to <input>_output.<format> next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// The voice group to highlight, e.g. soprano, alto, tenor or bass.
        #[arg(short, long)]
        voice: Option<String>,
        #[command(flatten)]
        highlight: HighlightArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Renders the unmodified score plus one file per part with that part highlighted.
    Voices {
        /// The score package (.mscz) to convert.
        input: PathBuf,
        /// The output directory. Defaults to the input's directory.
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        highlight: HighlightArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Converts several scores one after another.
    Batch {
        /// The score packages (.mscz) to convert.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// The voice group to highlight in every score.
        #[arg(short, long)]
        voice: Option<String>,
        /// The output directory. Defaults to each input's directory.
        #[arg(short = 'd', long)]
        output_dir: Option<PathBuf>,
        #[command(flatten)]
        highlight: HighlightArgs,
        #[command(flatten)]
        render: RenderArgs,
    },
    /// Lists the parts of a score.
    Parts {
        /// The score package (.mscz) to inspect.
        input: PathBuf,
        /// Prints the parts as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Prints the effective settings as YAML.
    Settings {},
}

#[derive(Serialize)]
struct PartListing<'a> {
    index: usize,
    name: &'a str,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert {
            input,
            output,
            voice,
            highlight,
            render,
        } => {
            check_input(&input)?;
            let extension = extension(&settings, &render);
            let output = output.unwrap_or_else(|| default_output(&input, None, &extension));
            let converter = converter(&settings, &highlight, &render)?;

            let conversion = match voice {
                Some(voice) => {
                    println!("Highlighting voice group: {}", voice);
                    converter
                        .convert_with_highlight(&input, &output, &voice)
                        .await?
                }
                None => converter.convert(&input, &output).await?,
            };

            if let Some(part) = conversion.voice() {
                println!("Highlighted part: {}", part);
            }
            for kept in conversion.kept() {
                println!("Temporary file kept: {}", kept.display());
            }
            println!("Converted to {}", conversion.output().display());
        }
        Commands::Voices {
            input,
            output_dir,
            highlight,
            render,
        } => {
            check_input(&input)?;
            let extension = extension(&settings, &render);
            let output_dir = output_dir
                .or_else(|| input.parent().map(Path::to_path_buf))
                .unwrap_or_default();
            let converter = converter(&settings, &highlight, &render)?;

            let conversions = converter
                .convert_all_voices(&input, &output_dir, &extension)
                .await?;
            println!("Files (count: {}):", conversions.len());
            for conversion in conversions {
                println!("- {}", conversion.output().display());
            }
        }
        Commands::Batch {
            inputs,
            voice,
            output_dir,
            highlight,
            render,
        } => {
            let extension = extension(&settings, &render);
            let converter = converter(&settings, &highlight, &render)?;

            let report = converter
                .convert_batch(&inputs, output_dir.as_deref(), &extension, voice.as_deref())
                .await;

            println!(
                "Converted {} of {} files:",
                report.succeeded(),
                report.items().len()
            );
            for item in report.items() {
                match &item.result {
                    Ok(conversion) => println!(
                        "- {} -> {}",
                        filename_display(&item.input),
                        conversion.output().display()
                    ),
                    Err(e) => println!("- {} failed: {}", filename_display(&item.input), e),
                }
            }

            if !report.is_success() {
                return Err(format!("{} of the files failed to convert", report.failed()).into());
            }
        }
        Commands::Parts { input, json } => {
            check_input(&input)?;
            let package = ScorePackage::open(&input)?;
            let parts = list_parts(package.document())?;

            if json {
                let listing: Vec<PartListing> = parts
                    .iter()
                    .enumerate()
                    .map(|(index, part)| PartListing {
                        index: index + 1,
                        name: part.name(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                println!("Parts (count: {}):", parts.len());
                for (index, part) in parts.iter().enumerate() {
                    println!("{:>3}. {}", index + 1, part);
                }
            }
        }
        Commands::Settings {} => {
            print!("{}", settings.to_yaml()?);
        }
    }

    Ok(())
}

/// Verifies that the input exists and looks like a score package.
fn check_input(input: &Path) -> Result<(), Box<dyn Error>> {
    Ok(check_package_path(input)?)
}

fn extension(settings: &Settings, render: &RenderArgs) -> String {
    render
        .format
        .as_deref()
        .map(|format| format.trim_start_matches('.'))
        .unwrap_or_else(|| settings.output_extension())
        .to_string()
}

/// Builds a converter from the settings, with command line flags taking precedence.
fn converter(
    settings: &Settings,
    highlight: &HighlightArgs,
    render: &RenderArgs,
) -> Result<Converter<MuseScore>, Box<dyn Error>> {
    let timeout = match &render.render_timeout {
        Some(timeout) => Settings::parse_duration(timeout)?,
        None => settings.render_timeout()?,
    };
    let musescore = MuseScore::discover(
        render
            .musescore_path
            .as_deref()
            .unwrap_or_else(|| settings.musescore_path()),
        timeout,
    )?;
    let options = HighlightOptions {
        volume_boost: highlight.volume_boost.unwrap_or(settings.volume_boost()),
        master_volume: highlight.master_volume.unwrap_or(settings.master_volume()),
        use_choir: highlight.choir || settings.use_choir(),
    };

    Ok(
        Converter::new(musescore, Profiles::load(settings)?, options)
            .keep_temp(render.keep_temp || settings.keep_temp()),
    )
}
