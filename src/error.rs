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
use std::path::PathBuf;

/// Errors surfaced by conversion sessions. Each variant carries the identifier
/// the user needs to correct their input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{}' is not a valid score package: {reason}", path.display())]
    InvalidPackage { path: PathBuf, reason: String },

    #[error("The score contains no parts")]
    EmptyScore,

    #[error(
        "Could not find voice group '{query}'. Available parts: {}",
        available.join(", ")
    )]
    VoiceNotFound {
        query: String,
        available: Vec<String>,
    },

    #[error("Failed to modify score: {0}")]
    MutationFailed(String),

    #[error("Rendering failed: {0}")]
    RenderFailed(String),

    #[error("Renderer executable not found: {0}")]
    RendererNotFound(String),

    #[error(
        "{error} (temporary files kept: {})",
        kept.iter().map(|path| path.display().to_string()).collect::<Vec<String>>().join(", ")
    )]
    TempKept {
        #[source]
        error: Box<Error>,
        kept: Vec<PathBuf>,
    },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convenience constructor for package errors.
    pub(crate) fn invalid_package(path: impl Into<PathBuf>, reason: impl ToString) -> Error {
        Error::InvalidPackage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Attaches temporary files that were kept despite the failure. Paths are placed ahead of
    /// any the error already carries.
    pub(crate) fn with_kept(self, mut paths: Vec<PathBuf>) -> Error {
        if paths.is_empty() {
            return self;
        }
        match self {
            Error::TempKept { error, kept } => {
                paths.extend(kept);
                Error::TempKept { error, kept: paths }
            }
            other => Error::TempKept {
                error: Box::new(other),
                kept: paths,
            },
        }
    }

    /// Temporary files left on disk for inspection when the failure happened.
    pub fn kept(&self) -> &[PathBuf] {
        match self {
            Error::TempKept { kept, .. } => kept,
            _ => &[],
        }
    }

    /// The failure itself, without any kept temporary files attached.
    pub fn inner(&self) -> &Error {
        match self {
            Error::TempKept { error, .. } => error.inner(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
