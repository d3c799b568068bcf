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
//! Canonical voice keys and the abbreviations score authors commonly use for them.

/// Voice keys and their synonyms, in lookup order.
const VOICE_ABBREVIATIONS: &[(&str, &[&str])] = &[
    ("soprano", &["soprano", "sop", "s"]),
    (
        "soprano1",
        &["soprano1", "soprano 1", "sop1", "sop 1", "s1", "s 1"],
    ),
    (
        "soprano2",
        &["soprano2", "soprano 2", "sop2", "sop 2", "s2", "s 2"],
    ),
    ("alto", &["alto", "alt", "a"]),
    ("alto1", &["alto1", "alto 1", "alt1", "alt 1", "a1", "a 1"]),
    ("alto2", &["alto2", "alto 2", "alt2", "alt 2", "a2", "a 2"]),
    ("tenor", &["tenor", "ten", "t"]),
    ("tenor1", &["tenor1", "tenor 1", "ten1", "ten 1", "t1", "t 1"]),
    ("tenor2", &["tenor2", "tenor 2", "ten2", "ten 2", "t2", "t 2"]),
    ("baritone", BARITONE_SYNONYMS),
    ("bass1", BARITONE_SYNONYMS),
    ("bass", &["bass", "bas", "b"]),
    ("bass2", &["bass2", "bass 2", "bas2", "bas 2", "b2", "b 2"]),
];

// The first bass line and the baritone are sung by the same section.
const BARITONE_SYNONYMS: &[&str] = &[
    "baritone", "bariton", "bar", "bass1", "bass 1", "bas1", "bas 1", "b1", "b 1",
];

/// Normalizes a user query: lowercase with whitespace removed.
pub fn normalize_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalizes a part name or synonym: lowercase with whitespace and periods removed.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Iterates over every voice key with its normalized synonyms, in lookup order.
pub fn voice_keys() -> impl Iterator<Item = (&'static str, Vec<String>)> {
    VOICE_ABBREVIATIONS
        .iter()
        .map(|(key, synonyms)| (*key, synonyms.iter().map(|s| normalize_name(s)).collect()))
}

/// Gets the normalized synonyms of a voice key, or None if the key is unknown.
pub fn synonyms(key: &str) -> Option<Vec<String>> {
    voice_keys()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, synonyms)| synonyms)
}

/// Maps a name to its canonical voice key: the key itself, or the first key listing the name
/// as a synonym.
pub fn canonical_key(name: &str) -> Option<&'static str> {
    let normalized = normalize_name(name);
    voice_keys()
        .find(|(key, _)| *key == normalized)
        .or_else(|| voice_keys().find(|(_, synonyms)| synonyms.contains(&normalized)))
        .map(|(key, _)| key)
}
