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
use std::fmt;

use tracing::debug;

use super::{Document, NodeId, PART_TAG};
use crate::error::{Error, Result};

/// Locations a part's display name may be stored at, in order of preference.
const NAME_PATHS: &[&[&str]] = &[
    &["Staff", "Instrument", "trackName"],
    &["Staff", "Instrument", "longName"],
    &["Instrument", "trackName"],
    &["Instrument", "longName"],
];

/// A single instrumental or vocal line in a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// The handle of the part node.
    id: NodeId,
    /// The display name of the part.
    name: String,
}

impl Part {
    /// Gets the handle of the part node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Gets the display name of the part.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Lists every named part in the document in document order. Parts without a resolvable
/// name are left out since they can be neither matched nor displayed.
pub fn list_parts(doc: &Document) -> Result<Vec<Part>> {
    let nodes = doc.descendants_named(doc.root(), PART_TAG);
    if nodes.is_empty() {
        return Err(Error::EmptyScore);
    }

    Ok(nodes
        .into_iter()
        .filter_map(|id| match part_name(doc, id) {
            Some(name) => Some(Part { id, name }),
            None => {
                debug!(part = ?id, "Part has no name, excluding it.");
                None
            }
        })
        .collect())
}

/// Resolves the display name of a part node.
pub fn part_name(doc: &Document, part: NodeId) -> Option<String> {
    NAME_PATHS.iter().find_map(|path| {
        let node = doc.find_path(part, path)?;
        let text = doc.text(node)?;
        let name = text.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}
