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
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;

const ENV_PREFIX: &str = "MSCZ_HIGHLIGHT";
const DEFAULT_MUSESCORE_PATH: &str = "MuseScore4";
const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_VOLUME_BOOST: i32 = 12;
const DEFAULT_MASTER_VOLUME: i32 = 60;
const DEFAULT_OUTPUT_EXTENSION: &str = "mp3";

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Settings {
    /// The MuseScore executable name or path.
    musescore_path: Option<String>,

    /// How long a single render may take, e.g. "90s" or "5m".
    render_timeout: Option<String>,

    /// Volume boost in dB for the highlighted voice.
    volume_boost: Option<i32>,

    /// Mixer volume for every other part.
    master_volume: Option<i32>,

    /// Whether other vocal parts are converted to choir voices.
    use_choir: Option<bool>,

    /// Whether intermediate packages and extraction directories are kept.
    keep_temp: Option<bool>,

    /// The extension of rendered files, which also selects the renderer's output format.
    output_extension: Option<String>,

    /// A YAML file replacing the built-in highlight instruments.
    highlight_profiles: Option<String>,

    /// A YAML file replacing the built-in choir instruments.
    choir_profiles: Option<String>,
}

impl Settings {
    /// Loads settings from an optional YAML file, overlaid by MSCZ_HIGHLIGHT_* environment
    /// variables.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        Ok(builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?)
    }

    /// Returns the MuseScore executable (default: MuseScore4).
    pub fn musescore_path(&self) -> &str {
        self.musescore_path
            .as_deref()
            .unwrap_or(DEFAULT_MUSESCORE_PATH)
    }

    /// Returns the render timeout (default: 5 minutes).
    pub fn render_timeout(&self) -> Result<Duration, ConfigError> {
        match &self.render_timeout {
            Some(timeout) => Settings::parse_duration(timeout),
            None => Ok(DEFAULT_RENDER_TIMEOUT),
        }
    }

    /// Parses a duration string such as `90s` or `5m`.
    pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
        Ok(DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::InvalidDuration {
                value: value.to_string(),
                reason: e.to_string(),
            })?
            .into())
    }

    /// Returns the highlighted voice boost in dB (default: 12).
    pub fn volume_boost(&self) -> i32 {
        self.volume_boost.unwrap_or(DEFAULT_VOLUME_BOOST)
    }

    /// Returns the volume of the other parts (default: 60).
    pub fn master_volume(&self) -> i32 {
        self.master_volume.unwrap_or(DEFAULT_MASTER_VOLUME)
    }

    /// Returns whether other vocal parts become choir voices (default: false).
    pub fn use_choir(&self) -> bool {
        self.use_choir.unwrap_or(false)
    }

    /// Returns whether temporary files are kept (default: false).
    pub fn keep_temp(&self) -> bool {
        self.keep_temp.unwrap_or(false)
    }

    /// Returns the rendered file extension (default: mp3).
    pub fn output_extension(&self) -> &str {
        self.output_extension
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT_EXTENSION)
            .trim_start_matches('.')
    }

    /// Returns the highlight profile file, if one replaces the built-in table.
    pub fn highlight_profiles(&self) -> Option<&Path> {
        self.highlight_profiles.as_deref().map(Path::new)
    }

    /// Returns the choir profile file, if one replaces the built-in table.
    pub fn choir_profiles(&self) -> Option<&Path> {
        self.choir_profiles.as_deref().map(Path::new)
    }

    /// Renders the effective settings, defaults included, as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        let effective = Settings {
            musescore_path: Some(self.musescore_path().to_string()),
            render_timeout: Some(
                self.render_timeout
                    .clone()
                    .unwrap_or_else(|| format!("{}s", DEFAULT_RENDER_TIMEOUT.as_secs())),
            ),
            volume_boost: Some(self.volume_boost()),
            master_volume: Some(self.master_volume()),
            use_choir: Some(self.use_choir()),
            keep_temp: Some(self.keep_temp()),
            output_extension: Some(self.output_extension().to_string()),
            highlight_profiles: self.highlight_profiles.clone(),
            choir_profiles: self.choir_profiles.clone(),
        };
        Ok(serde_yml::to_string(&effective)?)
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.musescore_path(), "MuseScore4");
        assert_eq!(settings.render_timeout().unwrap(), Duration::from_secs(300));
        assert_eq!(settings.volume_boost(), 12);
        assert_eq!(settings.master_volume(), 60);
        assert!(!settings.use_choir());
        assert!(!settings.keep_temp());
        assert_eq!(settings.output_extension(), "mp3");
        assert!(settings.highlight_profiles().is_none());
    }

    #[test]
    #[serial]
    fn test_file_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        fs::write(
            &path,
            r#"
            musescore_path: /opt/musescore/bin/mscore
            render_timeout: 90s
            volume_boost: 6
            use_choir: true
            output_extension: .wav
            "#,
        )
        .unwrap();

        env::set_var("MSCZ_HIGHLIGHT_MASTER_VOLUME", "40");
        let settings = Settings::load(Some(&path));
        env::remove_var("MSCZ_HIGHLIGHT_MASTER_VOLUME");
        let settings = settings.unwrap();

        assert_eq!(settings.musescore_path(), "/opt/musescore/bin/mscore");
        assert_eq!(settings.render_timeout().unwrap(), Duration::from_secs(90));
        assert_eq!(settings.volume_boost(), 6);
        assert_eq!(settings.master_volume(), 40);
        assert!(settings.use_choir());
        assert_eq!(settings.output_extension(), "wav");
    }

    #[test]
    #[serial]
    fn test_invalid_timeout() {
        let settings: Settings = serde_yml::from_str("render_timeout: soon").unwrap();
        assert!(matches!(
            settings.render_timeout(),
            Err(ConfigError::InvalidDuration { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_effective_yaml() {
        let yaml = Settings::default().to_yaml().unwrap();
        assert!(yaml.contains("musescore_path: MuseScore4"));
        assert!(yaml.contains("volume_boost: 12"));
        assert!(yaml.contains("master_volume: 60"));
        assert!(yaml.contains("render_timeout: 300s"));
    }
}
