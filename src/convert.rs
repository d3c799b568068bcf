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
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{error, info, warn};

use crate::{
    config::Profiles,
    error::Result,
    highlight::{highlight, highlight_part, HighlightOptions},
    package::{check_package_path, ScorePackage, PACKAGE_EXTENSION},
    render::Renderer,
    score::list_parts,
    util::{file_stem_display, filename_display, numbered_output_name},
    voices::{canonical_key, normalize_name},
};

/// Label of the unmodified rendition produced alongside the per-voice renditions.
pub const ALL_VOICES: &str = "All Voices";

const MODIFIED_PREFIX: &str = "modified_";
const OUTPUT_SUFFIX: &str = "_output";

/// One rendered audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    output: PathBuf,
    voice: Option<String>,
    kept: Vec<PathBuf>,
}

impl Conversion {
    fn new(output: &Path) -> Conversion {
        Conversion {
            output: output.to_path_buf(),
            voice: None,
            kept: Vec::new(),
        }
    }

    /// The rendered file.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// The name of the highlighted part, if any.
    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    /// Intermediate files left on disk because retention was requested.
    pub fn kept(&self) -> &[PathBuf] {
        &self.kept
    }
}

/// The outcome of converting one input of a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub input: PathBuf,
    pub result: Result<Conversion>,
}

/// Per-input results of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs conversion sessions. Each session unpacks its own copy of the input and cleans up
/// after itself; sessions never overlap.
pub struct Converter<R: Renderer> {
    renderer: R,
    profiles: Profiles,
    options: HighlightOptions,
    keep_temp: bool,
}

impl<R: Renderer> Converter<R> {
    pub fn new(renderer: R, profiles: Profiles, options: HighlightOptions) -> Converter<R> {
        Converter {
            renderer,
            profiles,
            options,
            keep_temp: false,
        }
    }

    /// Leaves extraction directories and modified packages on disk for inspection.
    pub fn keep_temp(mut self, keep_temp: bool) -> Converter<R> {
        self.keep_temp = keep_temp;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Renders the score unmodified.
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<Conversion> {
        // Surfaces unreadable packages before the renderer sees them.
        drop(ScorePackage::open(input)?);
        self.renderer.render(input, output).await?;
        Ok(Conversion::new(output))
    }

    /// Renders the score with the part best matching `query` highlighted.
    pub async fn convert_with_highlight(
        &self,
        input: &Path,
        output: &Path,
        query: &str,
    ) -> Result<Conversion> {
        let mut package = ScorePackage::open(input)?;
        info!(
            input = filename_display(input),
            voice = query,
            "Highlighting voice group."
        );

        let mut result = match highlight(package.document_mut(), &self.profiles, query, &self.options)
        {
            Ok(candidate) => self
                .render_modified(&package, output)
                .await
                .map(|mut conversion| {
                    conversion.voice = Some(candidate.part().name().to_string());
                    conversion
                }),
            Err(e) => Err(e),
        };

        if let Some(workdir) = self.retain_package(package) {
            result = match result {
                Ok(mut conversion) => {
                    conversion.kept.insert(0, workdir);
                    Ok(conversion)
                }
                Err(e) => Err(e.with_kept(vec![workdir])),
            };
        }
        result
    }

    /// Renders the unmodified score followed by one rendition per part, each with that part
    /// highlighted. Files are written to `output_dir` as `<stem>_<NN>_<part>.<extension>`,
    /// numbered in part order with the unmodified rendition as 00.
    pub async fn convert_all_voices(
        &self,
        input: &Path,
        output_dir: &Path,
        extension: &str,
    ) -> Result<Vec<Conversion>> {
        let mut package = ScorePackage::open(input)?;
        let result = self
            .render_voices(&mut package, input, output_dir, extension)
            .await;
        match self.retain_package(package) {
            Some(workdir) => match result {
                Ok(mut conversions) => {
                    if let Some(all_voices) = conversions.first_mut() {
                        all_voices.kept.push(workdir);
                    }
                    Ok(conversions)
                }
                Err(e) => Err(e.with_kept(vec![workdir])),
            },
            None => result,
        }
    }

    /// Converts each input in turn, highlighting `query` when given. A failing input is
    /// recorded and the batch moves on to the next one.
    pub async fn convert_batch(
        &self,
        inputs: &[PathBuf],
        output_dir: Option<&Path>,
        extension: &str,
        query: Option<&str>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, input) in inputs.iter().enumerate() {
            info!(
                input = filename_display(input),
                item = index + 1,
                total = inputs.len(),
                "Converting batch item."
            );
            let output = default_output(input, output_dir, extension);
            let result = match (check_package_path(input), query) {
                (Err(e), _) => Err(e),
                (Ok(()), Some(query)) => self.convert_with_highlight(input, &output, query).await,
                (Ok(()), None) => self.convert(input, &output).await,
            };
            if let Err(e) = &result {
                error!(input = filename_display(input), err = %e, "Conversion failed.");
            }
            report.items.push(BatchItem {
                input: input.clone(),
                result,
            });
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch finished."
        );
        report
    }

    async fn render_voices(
        &self,
        package: &mut ScorePackage,
        input: &Path,
        output_dir: &Path,
        extension: &str,
    ) -> Result<Vec<Conversion>> {
        let parts = list_parts(package.document())?;
        let pristine = package.document().clone();
        let stem = file_stem_display(input);
        let mut conversions = Vec::with_capacity(parts.len() + 1);

        let all_voices = output_dir.join(numbered_output_name(stem, 0, ALL_VOICES, extension));
        info!(output = %all_voices.display(), "Rendering all voices.");
        self.renderer.render(input, &all_voices).await?;
        conversions.push(Conversion::new(&all_voices));

        for (index, part) in parts.iter().enumerate() {
            *package.document_mut() = pristine.clone();
            let profile = self.profiles.highlight_for(&voice_key(part.name()));
            info!(
                part = part.name(),
                number = index + 1,
                total = parts.len(),
                instrument = profile.long_name(),
                "Rendering voice."
            );
            highlight_part(
                package.document_mut(),
                &self.profiles,
                part.id(),
                profile,
                &self.options,
            )?;

            let output =
                output_dir.join(numbered_output_name(stem, index + 1, part.name(), extension));
            let mut conversion = self.render_modified(package, &output).await?;
            conversion.voice = Some(part.name().to_string());
            conversions.push(conversion);
        }

        Ok(conversions)
    }

    /// Writes the package's document back, zips it into a temporary package and renders that.
    async fn render_modified(&self, package: &ScorePackage, output: &Path) -> Result<Conversion> {
        let staged = tempfile::Builder::new()
            .prefix(MODIFIED_PREFIX)
            .suffix(&format!(".{}", PACKAGE_EXTENSION))
            .tempfile()?
            .into_temp_path();

        let result = self.stage_and_render(package, &staged, output).await;
        let kept = self.retain_staged(staged);
        if let Err(e) = result {
            return Err(e.with_kept(kept.into_iter().collect()));
        }

        let mut conversion = Conversion::new(output);
        conversion.kept.extend(kept);
        Ok(conversion)
    }

    async fn stage_and_render(
        &self,
        package: &ScorePackage,
        staged: &Path,
        output: &Path,
    ) -> Result<()> {
        package.save()?;
        package.repackage(staged)?;
        self.renderer.render(staged, output).await
    }

    fn retain_staged(&self, staged: TempPath) -> Option<PathBuf> {
        if !self.keep_temp {
            return None;
        }
        match staged.keep() {
            Ok(path) => {
                warn!(path = %path.display(), "Modified package kept.");
                Some(path)
            }
            Err(e) => {
                warn!(err = %e, "Unable to keep modified package.");
                None
            }
        }
    }

    fn retain_package(&self, package: ScorePackage) -> Option<PathBuf> {
        if !self.keep_temp {
            return None;
        }
        let workdir = package.keep();
        warn!(workdir = %workdir.display(), "Extraction directory kept.");
        Some(workdir)
    }
}

/// The output used when none is given: `<stem>_output.<extension>` next to the input, or in
/// `output_dir` when one is given.
pub fn default_output(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let name = format!(
        "{}{}.{}",
        file_stem_display(input),
        OUTPUT_SUFFIX,
        extension
    );
    match output_dir.or_else(|| input.parent()) {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// The highlight instrument key for a part: its voice group when the name is a known voice,
/// the normalized name otherwise.
fn voice_key(name: &str) -> String {
    canonical_key(name)
        .map(str::to_string)
        .unwrap_or_else(|| normalize_name(name))
}
