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

/// Characters that are not allowed in file names on at least one platform.
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_FILE_NAME_LEN: usize = 100;
const UNNAMED: &str = "unnamed";

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Extracts the file stem from a path, returning a fallback if the stem is unreadable.
pub fn file_stem_display(path: &Path) -> &str {
    path.file_stem()
        .and_then(|f| f.to_str())
        .unwrap_or(UNNAMED)
}

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// Turns a part name into something usable as a file name. Invalid characters become
/// underscores, whitespace runs collapse to one space, leading and trailing spaces and periods
/// are dropped and the result is capped at 100 characters.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILE_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<&str>>().join(" ");
    let trimmed: String = collapsed
        .trim_matches(|c| c == ' ' || c == '.')
        .chars()
        .take(MAX_FILE_NAME_LEN)
        .collect();

    if trimmed.is_empty() {
        UNNAMED.to_string()
    } else {
        trimmed
    }
}

/// Builds the name of one numbered rendition of a score: `<stem>_<NN>_<label>.<extension>`.
pub fn numbered_output_name(stem: &str, number: usize, label: &str, extension: &str) -> String {
    format!(
        "{}_{:02}_{}.{}",
        stem,
        number,
        sanitize_file_name(label),
        extension
    )
}
