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
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use tracing::{debug, info};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::{
    error::{Error, Result},
    score::Document,
    util::{file_stem_display, filename_display},
};

/// Extension of the score document stored inside a package.
pub const SCORE_EXTENSION: &str = "mscx";
/// Extension of a score package.
pub const PACKAGE_EXTENSION: &str = "mscz";

const PRIMARY_SCORE: &str = "score.mscx";
const WORKDIR_PREFIX: &str = "mscz_";

/// An unpacked MuseScore package. The extraction directory lives as long as the package and is
/// removed when it is dropped, unless the package is kept.
pub struct ScorePackage {
    source: PathBuf,
    workdir: TempDir,
    score_path: PathBuf,
    document: Document,
}

impl ScorePackage {
    /// Unpacks the package at `path` and parses its score document.
    pub fn open(path: &Path) -> Result<ScorePackage> {
        let file = File::open(path).map_err(|e| Error::invalid_package(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| Error::invalid_package(path, e))?;

        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()?;
        archive
            .extract(workdir.path())
            .map_err(|e| Error::invalid_package(path, e))?;
        debug!(
            package = filename_display(path),
            workdir = %workdir.path().display(),
            members = archive.len(),
            "Extracted package."
        );

        let score_path = locate_score(workdir.path(), file_stem_display(path))?
            .ok_or_else(|| Error::invalid_package(path, "no score document (.mscx) found"))?;
        let xml = fs::read_to_string(&score_path).map_err(|e| Error::invalid_package(path, e))?;
        let document = Document::parse(&xml).map_err(|e| Error::invalid_package(path, e))?;
        info!(
            package = filename_display(path),
            score = filename_display(&score_path),
            "Opened score package."
        );

        Ok(ScorePackage {
            source: path.to_path_buf(),
            workdir,
            score_path,
            document,
        })
    }

    /// The package this was unpacked from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The extracted score document on disk.
    pub fn score_path(&self) -> &Path {
        &self.score_path
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Writes the current document back over the extracted score document.
    pub fn save(&self) -> Result<()> {
        let xml = self
            .document
            .to_xml()
            .map_err(|e| Error::MutationFailed(e.to_string()))?;
        fs::write(&self.score_path, xml)?;
        debug!(score = %self.score_path.display(), "Saved score document.");
        Ok(())
    }

    /// Zips the extraction directory into a new package at `output`. Members other than the
    /// score document are copied through unchanged.
    pub fn repackage(&self, output: &Path) -> Result<()> {
        let mut files = Vec::new();
        collect_files(self.workdir.path(), &mut files)?;
        files.sort();

        let mut zip = ZipWriter::new(File::create(output)?);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        for file in files {
            let name = member_name(self.workdir.path(), &file)?;
            zip.start_file(name, options).map_err(io::Error::from)?;
            io::copy(&mut File::open(&file)?, &mut zip)?;
        }
        zip.finish().map_err(io::Error::from)?;

        debug!(output = %output.display(), "Repackaged score.");
        Ok(())
    }

    /// Keeps the extraction directory on disk and returns its location.
    pub fn keep(self) -> PathBuf {
        let ScorePackage { workdir, .. } = self;
        workdir.keep()
    }
}

/// Checks that `path` names an existing file with the package extension.
pub fn check_package_path(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::invalid_package(path, "file not found"));
    }
    let is_package = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PACKAGE_EXTENSION));
    if !is_package {
        return Err(Error::invalid_package(
            path,
            format!("expected a .{} file", PACKAGE_EXTENSION),
        ));
    }
    Ok(())
}

/// Finds the score document in an extraction directory: `score.mscx`, then `<stem>.mscx`, then
/// the first `.mscx` file in name order.
fn locate_score(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let primary = dir.join(PRIMARY_SCORE);
    if primary.is_file() {
        return Ok(Some(primary));
    }

    let named = dir.join(format!("{}.{}", stem, SCORE_EXTENSION));
    if named.is_file() {
        return Ok(Some(named));
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_score = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCORE_EXTENSION));
        if is_score && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// The zip member name of `file`: its path relative to `root`, joined with forward slashes.
fn member_name(root: &Path, file: &Path) -> io::Result<String> {
    let relative = file
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let segments: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}
