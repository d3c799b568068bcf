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
//! Renders MuseScore score packages to audio, optionally bringing a single voice part to the
//! front so singers can practice along with it.

pub mod config;
pub mod convert;
pub mod error;
pub mod highlight;
pub mod package;
pub mod render;
pub mod resolver;
pub mod score;
pub mod util;
pub mod voices;
#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
