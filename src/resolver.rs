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
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::score::{list_parts, Document, Part};
use crate::voices::{normalize_name, normalize_query, synonyms, voice_keys};

pub const EXACT_SCORE: i64 = 1000;
pub const ABBREVIATION_SCORE: i64 = 900;
pub const CROSS_REFERENCE_SCORE: i64 = 850;

/// How a candidate part was matched against a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The normalized part name equals the query.
    Exact,
    /// The part name is a known abbreviation of the queried voice.
    Abbreviation,
    /// The query is an abbreviation of a voice the part name also denotes.
    CrossReference,
    /// Character overlap scoring.
    Heuristic,
}

/// A scored part produced while resolving a query.
#[derive(Debug, Clone)]
pub struct Candidate {
    part: Part,
    score: i64,
    kind: MatchKind,
}

impl Candidate {
    /// Gets the candidate part.
    pub fn part(&self) -> &Part {
        &self.part
    }

    /// Gets the similarity score.
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Gets how the candidate was matched.
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    /// Returns true if the part name matched the query exactly.
    pub fn is_exact(&self) -> bool {
        self.kind == MatchKind::Exact
    }
}

/// Resolves a free text voice query to a single part of the document. Fails with
/// [`Error::VoiceNotFound`] listing every available part name when nothing scores above zero.
pub fn resolve(doc: &Document, query: &str) -> Result<Candidate> {
    resolve_in(list_parts(doc)?, query)
}

/// Resolves a query against an already gathered inventory.
pub fn resolve_in(parts: Vec<Part>, query: &str) -> Result<Candidate> {
    let available: Vec<String> = parts.iter().map(|part| part.name().to_string()).collect();
    let winner = rank(parts, query)
        .into_iter()
        .next()
        .filter(|candidate| candidate.score > 0);

    match winner {
        Some(candidate) => {
            if !candidate.is_exact() {
                warn!(
                    query,
                    part = candidate.part.name(),
                    score = candidate.score,
                    "Using inferred part for voice group."
                );
            }
            Ok(candidate)
        }
        None => Err(Error::VoiceNotFound {
            query: query.to_string(),
            available,
        }),
    }
}

/// Scores every part against the query, best first. Parts with equal scores keep their
/// document order.
pub fn rank(parts: Vec<Part>, query: &str) -> Vec<Candidate> {
    let query = normalize_query(query);
    let mut candidates: Vec<Candidate> = parts
        .into_iter()
        .map(|part| {
            let (score, kind) = similarity(&query, part.name());
            debug!(part = part.name(), score, ?kind, "Scored part.");
            Candidate { part, score, kind }
        })
        .collect();
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}

/// Computes the similarity between a normalized query and a part name. The tiers are tried
/// in order and the first that applies decides the score.
pub fn similarity(query: &str, name: &str) -> (i64, MatchKind) {
    let name = normalize_name(name);

    if name == query {
        return (EXACT_SCORE, MatchKind::Exact);
    }

    if synonyms(query).is_some_and(|synonyms| synonyms.contains(&name)) {
        return (ABBREVIATION_SCORE, MatchKind::Abbreviation);
    }

    let cross_referenced = voice_keys().any(|(key, synonyms)| {
        synonyms.iter().any(|synonym| synonym == query)
            && (name == key || synonyms.contains(&name))
    });
    if cross_referenced {
        return (CROSS_REFERENCE_SCORE, MatchKind::CrossReference);
    }

    (heuristic_score(query, &name), MatchKind::Heuristic)
}

fn heuristic_score(query: &str, name: &str) -> i64 {
    let mut score = 0;

    if let (Some(q), Some(n)) = (query.chars().next(), name.chars().next()) {
        if q == n {
            score += 50;
        }
    }

    if name.contains(query) {
        score += 40;
    } else if query.contains(name) {
        score += 35;
    }

    // Earlier query characters weigh more.
    let query_len = query.chars().count() as i64;
    for (i, c) in query.chars().enumerate() {
        if name.contains(c) {
            score += query_len - i as i64;
        }
    }

    let name_len = name.chars().count();
    if name_len <= 3 {
        score += 20;
    } else if name_len <= 6 {
        score += 10;
    }
    if name_len > 15 {
        score -= 10;
    }

    score
}
