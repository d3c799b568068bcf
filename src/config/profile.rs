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
use std::collections::HashMap;
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use super::error::ConfigError;
use super::settings::Settings;

const HIGHLIGHT_INSTRUMENTS: &str = include_str!("../../assets/highlight_instruments.yaml");
const CHOIR_INSTRUMENTS: &str = include_str!("../../assets/choir_instruments.yaml");

/// The highlight profile used when a voice group has no entry of its own.
pub const FALLBACK_VOICE: &str = "bass";

/// Static display, range and MIDI properties of one instrument.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct InstrumentProfile {
    /// The instrument identity tag, e.g. "alto-saxophone".
    id: String,
    /// The long display name.
    long_name: String,
    /// The short display name.
    short_name: String,
    /// The instrument id, e.g. "wind.reed.saxophone.alto".
    instrument_id: String,
    /// The General MIDI program number.
    program: u8,
    /// Lowest possible pitch.
    min_pitch_p: u8,
    /// Highest possible pitch.
    max_pitch_p: u8,
    /// Lowest idiomatic pitch.
    min_pitch_a: u8,
    /// Highest idiomatic pitch.
    max_pitch_a: u8,
    /// Diatonic transposition. Absent for non-transposing instruments.
    transpose_diatonic: Option<i32>,
    /// Chromatic transposition. Absent for non-transposing instruments.
    transpose_chromatic: Option<i32>,
    /// Clef override.
    clef: Option<String>,
}

impl InstrumentProfile {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    /// Returns the possible pitch range as (low, high).
    pub fn possible_range(&self) -> (u8, u8) {
        (self.min_pitch_p, self.max_pitch_p)
    }

    /// Returns the idiomatic pitch range as (low, high).
    pub fn acceptable_range(&self) -> (u8, u8) {
        (self.min_pitch_a, self.max_pitch_a)
    }

    /// Returns the (diatonic, chromatic) transposition if the instrument transposes.
    pub fn transposition(&self) -> Option<(i32, i32)> {
        match (self.transpose_diatonic, self.transpose_chromatic) {
            (None, None) => None,
            (diatonic, chromatic) => Some((diatonic.unwrap_or(0), chromatic.unwrap_or(0))),
        }
    }

    pub fn clef(&self) -> Option<&str> {
        self.clef.as_deref()
    }
}

/// A named, read-only table of instrument profiles keyed by voice.
#[derive(Clone, Debug)]
pub struct ProfileTable {
    name: String,
    profiles: HashMap<String, InstrumentProfile>,
}

impl ProfileTable {
    /// Parses a table from YAML text.
    pub fn from_yaml(name: &str, yaml: &str) -> Result<ProfileTable, ConfigError> {
        Self::build(name, Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    /// Reads a table from a YAML file.
    pub fn from_file(name: &str, path: &Path) -> Result<ProfileTable, ConfigError> {
        Self::build(
            name,
            Config::builder().add_source(File::from(path).format(FileFormat::Yaml)),
        )
    }

    fn build(
        name: &str,
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ProfileTable, ConfigError> {
        let profiles = builder
            .build()?
            .try_deserialize::<HashMap<String, InstrumentProfile>>()?;
        debug!(table = name, count = profiles.len(), "Loaded instrument profiles.");
        Ok(ProfileTable {
            name: name.to_string(),
            profiles,
        })
    }

    /// Gets the name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up the profile for a voice key.
    pub fn get(&self, key: &str) -> Option<&InstrumentProfile> {
        self.profiles.get(key)
    }

    /// Returns the voice keys of the table in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        keys.sort();
        keys
    }
}

/// The highlight and choir tables, loaded once and shared read-only.
#[derive(Clone, Debug)]
pub struct Profiles {
    highlight: ProfileTable,
    choir: ProfileTable,
    fallback: InstrumentProfile,
}

impl Profiles {
    /// Creates the profile set. The highlight table must contain the fallback voice.
    pub fn new(highlight: ProfileTable, choir: ProfileTable) -> Result<Profiles, ConfigError> {
        let fallback = highlight
            .get(FALLBACK_VOICE)
            .cloned()
            .ok_or_else(|| ConfigError::MissingProfile {
                table: highlight.name().to_string(),
                key: FALLBACK_VOICE.to_string(),
            })?;
        Ok(Profiles {
            highlight,
            choir,
            fallback,
        })
    }

    /// Loads the tables compiled into the binary.
    pub fn builtin() -> Result<Profiles, ConfigError> {
        Profiles::new(
            ProfileTable::from_yaml("highlight", HIGHLIGHT_INSTRUMENTS)?,
            ProfileTable::from_yaml("choir", CHOIR_INSTRUMENTS)?,
        )
    }

    /// Loads the tables, preferring files named in the settings over the built-in ones.
    pub fn load(settings: &Settings) -> Result<Profiles, ConfigError> {
        let highlight = match settings.highlight_profiles() {
            Some(path) => ProfileTable::from_file("highlight", path)?,
            None => ProfileTable::from_yaml("highlight", HIGHLIGHT_INSTRUMENTS)?,
        };
        let choir = match settings.choir_profiles() {
            Some(path) => ProfileTable::from_file("choir", path)?,
            None => ProfileTable::from_yaml("choir", CHOIR_INSTRUMENTS)?,
        };
        Profiles::new(highlight, choir)
    }

    pub fn highlight(&self) -> &ProfileTable {
        &self.highlight
    }

    pub fn choir(&self) -> &ProfileTable {
        &self.choir
    }

    /// Gets the highlight profile for a voice key, falling back to the bass profile.
    pub fn highlight_for(&self, key: &str) -> &InstrumentProfile {
        self.highlight.get(key).unwrap_or(&self.fallback)
    }
}
