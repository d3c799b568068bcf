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
    env,
    ffi::OsString,
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tokio::{process::Command, time::timeout};
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    util::{duration_minutes_seconds, filename_display},
};

/// Executable names tried on the search path when the configured one can't be found.
const ALTERNATIVES: &[&str] = &[
    "MuseScore4",
    "MuseScore3",
    "musescore4",
    "musescore3",
    "musescore",
];

#[cfg(target_os = "windows")]
const INSTALL_LOCATIONS: &[&str] = &[
    r"C:\Program Files\MuseScore 4\bin\MuseScore4.exe",
    r"C:\Program Files (x86)\MuseScore 4\bin\MuseScore4.exe",
    r"C:\Program Files\MuseScore 3\bin\MuseScore3.exe",
    r"C:\Program Files (x86)\MuseScore 3\bin\MuseScore3.exe",
];

#[cfg(target_os = "macos")]
const INSTALL_LOCATIONS: &[&str] = &[
    "/Applications/MuseScore 4.app/Contents/MacOS/mscore",
    "/Applications/MuseScore 3.app/Contents/MacOS/mscore",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const INSTALL_LOCATIONS: &[&str] = &[
    "/usr/bin/musescore4",
    "/usr/bin/musescore3",
    "/usr/bin/musescore",
    "/usr/local/bin/musescore4",
    "/usr/local/bin/musescore3",
];

/// Turns a score package into an audio file.
pub trait Renderer {
    /// Renders the package at `input` to `output`. The output format follows the output file's
    /// extension.
    fn render(&self, input: &Path, output: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// Renders through the MuseScore command line.
#[derive(Debug, Clone)]
pub struct MuseScore {
    executable: PathBuf,
    timeout: Duration,
}

impl MuseScore {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> MuseScore {
        MuseScore {
            executable: executable.into(),
            timeout,
        }
    }

    /// Finds a MuseScore executable, preferring `preferred`, and falling back to well known
    /// names on the search path and then to the usual install locations.
    pub fn discover(preferred: &str, timeout: Duration) -> Result<MuseScore> {
        let executable = find_executable(preferred, env::var_os("PATH"), INSTALL_LOCATIONS)?;
        Ok(MuseScore::new(executable, timeout))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Renderer for MuseScore {
    async fn render(&self, input: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        if output.exists() {
            tokio::fs::remove_file(output).await?;
        }

        let mut command = Command::new(&self.executable);
        command
            .arg("--export-to")
            .arg(output)
            .arg(input)
            .kill_on_drop(true);

        info!(
            input = filename_display(input),
            output = %output.display(),
            executable = %self.executable.display(),
            "Rendering score."
        );
        let start = Instant::now();
        let result = match timeout(self.timeout, command.output()).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(Error::RenderFailed(format!(
                    "could not execute '{}': {}",
                    self.executable.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(Error::RenderFailed(format!(
                    "'{}' did not finish rendering '{}' within {}",
                    self.executable.display(),
                    filename_display(input),
                    duration_minutes_seconds(self.timeout)
                )))
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&result.stdout).trim().to_string();
            let detail = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "unknown error".to_string()
            };
            return Err(Error::RenderFailed(format!(
                "'{}' exited with {} while rendering '{}': {}",
                self.executable.display(),
                result.status,
                filename_display(input),
                detail
            )));
        }

        if !output.is_file() {
            return Err(Error::RenderFailed(format!(
                "'{}' did not create '{}'",
                self.executable.display(),
                output.display()
            )));
        }

        info!(
            output = filename_display(output),
            elapsed = %duration_minutes_seconds(start.elapsed()),
            "Rendered score."
        );
        Ok(())
    }
}

/// Resolves the renderer executable. `path_var` is the value of the search path variable.
fn find_executable(
    preferred: &str,
    path_var: Option<OsString>,
    install_locations: &[&str],
) -> Result<PathBuf> {
    if let Some(found) = search_path(preferred, path_var.as_ref()) {
        return Ok(found);
    }

    let preferred_path = Path::new(preferred);
    if preferred_path.is_absolute() && is_executable(preferred_path) {
        return Ok(preferred_path.to_path_buf());
    }

    for alternative in ALTERNATIVES {
        if let Some(found) = search_path(alternative, path_var.as_ref()) {
            info!(
                requested = preferred,
                found = %found.display(),
                "Using alternative MuseScore executable."
            );
            return Ok(found);
        }
    }

    for location in install_locations {
        let location = Path::new(location);
        if is_executable(location) {
            info!(
                requested = preferred,
                found = %location.display(),
                "Using MuseScore from install location."
            );
            return Ok(location.to_path_buf());
        }
    }

    Err(Error::RendererNotFound(format!(
        "'{}' was not found. Tried the search path ({}) and the install locations ({}). \
         Install MuseScore 4 or 3, or point musescore_path at the executable.",
        preferred,
        ALTERNATIVES.join(", "),
        install_locations.join(", ")
    )))
}

/// Looks `name` up in each directory of `path_var`. Names with a directory component are
/// checked as given.
fn search_path(name: &str, path_var: Option<&OsString>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let path_var = path_var?;
    for dir in env::split_paths(path_var) {
        let found = dir.join(name);
        if is_executable(&found) {
            debug!(found = %found.display(), "Found executable on search path.");
            return Some(found);
        }
        if cfg!(windows) {
            let found = found.with_extension("exe");
            if is_executable(&found) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}
