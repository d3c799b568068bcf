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
//! Rewrites the instrument, channel and mixer subtrees of a score so that one part stands
//! out from the rest.

use tracing::{debug, info};

use crate::config::{InstrumentProfile, ProfileTable, Profiles};
use crate::error::{Error, Result};
use crate::resolver::{resolve, Candidate};
use crate::score::{part_name, Document, NodeId, PART_TAG};
use crate::voices::normalize_query;

/// Controller number of the MIDI main volume.
pub const VOLUME_CONTROLLER: &str = "7";
/// Instrument id prefix shared by every vocal instrument.
pub const VOICE_PREFIX: &str = "voice.";
/// General MIDI "Choir Aahs".
pub const CHOIR_PROGRAM: u8 = 52;
/// Synthesizer assigned to rewritten channels.
pub const DEFAULT_SYNTH: &str = "Fluid";
/// Glissando style given to choir voices.
pub const CHOIR_GLISSANDO_STYLE: &str = "portamento";

const BASE_VOLUME: i32 = 100;
const MAX_VOLUME: i32 = 127;

/// Elements that only make sense for transposing instruments.
const TRANSPOSITION_TAGS: &[&str] = &[
    "transposeDiatonic",
    "transposeChromatic",
    "concertClef",
    "transposingClef",
];

/// Mixer and instrument options for a highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightOptions {
    /// Boost in dB applied on top of the base volume of the highlighted part.
    pub volume_boost: i32,
    /// Volume of every other part.
    pub master_volume: i32,
    /// Whether other vocal parts are converted to choir voices.
    pub use_choir: bool,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        HighlightOptions {
            volume_boost: 12,
            master_volume: 60,
            use_choir: false,
        }
    }
}

/// Resolves `query` to a part and highlights it. The highlight instrument is chosen by the
/// normalized query, falling back to the bass instrument for unknown voice groups.
pub fn highlight(
    doc: &mut Document,
    profiles: &Profiles,
    query: &str,
    options: &HighlightOptions,
) -> Result<Candidate> {
    let candidate = resolve(doc, query)?;
    let profile = profiles.highlight_for(&normalize_query(query));
    highlight_part(doc, profiles, candidate.part().id(), profile, options)?;
    Ok(candidate)
}

/// Highlights the given part node with `profile`. Either every change is applied or the
/// document is left untouched.
pub fn highlight_part(
    doc: &mut Document,
    profiles: &Profiles,
    target: NodeId,
    profile: &InstrumentProfile,
    options: &HighlightOptions,
) -> Result<()> {
    let mut working = doc.clone();

    replace_instrument(&mut working, target, profile)?;
    set_part_volume(
        &mut working,
        target,
        BASE_VOLUME.saturating_add(options.volume_boost),
    );

    let others: Vec<NodeId> = working
        .descendants_named(working.root(), PART_TAG)
        .into_iter()
        .filter(|part| *part != target)
        .collect();
    for part in others.iter() {
        set_part_volume(&mut working, *part, options.master_volume);
    }

    if options.use_choir {
        for part in others.iter() {
            convert_to_choir(&mut working, *part, profiles.choir())?;
        }
    }

    info!(
        part = %display_name(&working, target),
        instrument = profile.long_name(),
        "Highlighted part."
    );
    *doc = working;
    Ok(())
}

/// Clamps a volume into the MIDI controller range.
pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(0, MAX_VOLUME) as u8
}

/// Sets the main volume controller of a part's first channel. Parts without an instrument
/// have no mixer entry and are skipped.
pub fn set_part_volume(doc: &mut Document, part: NodeId, volume: i32) {
    let Some(instrument) = doc.find_descendant(part, "Instrument") else {
        debug!(part = %display_name(doc, part), "Part has no instrument, skipping volume.");
        return;
    };
    let channel = find_or_append_descendant(doc, instrument, "Channel");

    let controller = doc
        .descendants_named(channel, "controller")
        .into_iter()
        .find(|controller| doc.attribute(*controller, "ctrl") == Some(VOLUME_CONTROLLER));
    let controller = match controller {
        Some(controller) => controller,
        None => {
            let controller = doc.append_element(channel, "controller");
            doc.set_attribute(controller, "ctrl", VOLUME_CONTROLLER);
            controller
        }
    };
    doc.set_attribute(controller, "value", &clamp_volume(volume).to_string());
}

fn replace_instrument(doc: &mut Document, part: NodeId, profile: &InstrumentProfile) -> Result<()> {
    let instrument = instrument_for(doc, part)?;
    write_identity(doc, instrument, profile);

    match profile.transposition() {
        Some((diatonic, chromatic)) => {
            set_child_text(doc, instrument, "transposeDiatonic", &diatonic.to_string());
            set_child_text(doc, instrument, "transposeChromatic", &chromatic.to_string());
        }
        None => remove_children(doc, instrument, &TRANSPOSITION_TAGS[..2]),
    }
    set_child_text(doc, instrument, "instrumentId", profile.instrument_id());
    if let Some(clef) = profile.clef() {
        set_child_text(doc, instrument, "clef", clef);
    }

    let channel = find_or_append_descendant(doc, instrument, "Channel");
    set_program(doc, channel, profile.program());
    if doc.find_child(channel, "synti").is_none() {
        set_child_text(doc, channel, "synti", DEFAULT_SYNTH);
    }
    Ok(())
}

/// Replaces a vocal part's instrument with the matching choir voice. Parts that are not
/// vocal, or whose voice type has no choir profile, are left alone.
fn convert_to_choir(doc: &mut Document, part: NodeId, choir: &ProfileTable) -> Result<()> {
    let Some(instrument) = doc.find_descendant(part, "Instrument") else {
        return Ok(());
    };
    let Some(instrument_id) = doc
        .find_child(instrument, "instrumentId")
        .and_then(|id| doc.text(id))
    else {
        return Ok(());
    };
    let Some(voice) = instrument_id.trim().strip_prefix(VOICE_PREFIX) else {
        return Ok(());
    };
    let Some(profile) = choir.get(voice) else {
        debug!(
            part = %display_name(doc, part),
            voice, "No choir voice for part, leaving it unchanged."
        );
        return Ok(());
    };

    let instrument = instrument_for(doc, part)?;
    write_identity(doc, instrument, profile);
    set_child_text(doc, instrument, "instrumentId", profile.instrument_id());
    if let Some(clef) = profile.clef() {
        set_child_text(doc, instrument, "clef", clef);
    }
    set_child_text(doc, instrument, "glissandoStyle", CHOIR_GLISSANDO_STYLE);
    remove_children(doc, instrument, TRANSPOSITION_TAGS);

    let channel = find_or_append_descendant(doc, instrument, "Channel");
    set_program(doc, channel, CHOIR_PROGRAM);
    set_child_text(doc, channel, "synti", DEFAULT_SYNTH);

    info!(
        part = %display_name(doc, part),
        voice = profile.long_name(),
        "Converted part to choir voice."
    );
    Ok(())
}

/// Writes the identity, names and pitch ranges shared by highlight and choir instruments.
fn write_identity(doc: &mut Document, instrument: NodeId, profile: &InstrumentProfile) {
    doc.set_attribute(instrument, "id", profile.id());
    set_child_text(doc, instrument, "longName", profile.long_name());
    set_child_text(doc, instrument, "shortName", profile.short_name());
    set_child_text(doc, instrument, "trackName", profile.long_name());

    let (min_possible, max_possible) = profile.possible_range();
    let (min_acceptable, max_acceptable) = profile.acceptable_range();
    set_child_text(doc, instrument, "minPitchP", &min_possible.to_string());
    set_child_text(doc, instrument, "maxPitchP", &max_possible.to_string());
    set_child_text(doc, instrument, "minPitchA", &min_acceptable.to_string());
    set_child_text(doc, instrument, "maxPitchA", &max_acceptable.to_string());
}

/// Finds the part's instrument, creating one under its first staff if it has none.
fn instrument_for(doc: &mut Document, part: NodeId) -> Result<NodeId> {
    if let Some(instrument) = doc.find_descendant(part, "Instrument") {
        return Ok(instrument);
    }
    let staff = doc.find_descendant(part, "Staff").ok_or_else(|| {
        Error::MutationFailed(format!(
            "part '{}' has neither an Instrument nor a Staff element",
            display_name(doc, part)
        ))
    })?;
    Ok(doc.append_element(staff, "Instrument"))
}

fn set_program(doc: &mut Document, channel: NodeId, program: u8) {
    let node = match doc.find_child(channel, "program") {
        Some(node) => node,
        None => doc.append_element(channel, "program"),
    };
    doc.set_attribute(node, "value", &program.to_string());
}

fn set_child_text(doc: &mut Document, parent: NodeId, tag: &str, text: &str) -> NodeId {
    let node = match doc.find_child(parent, tag) {
        Some(node) => node,
        None => doc.append_element(parent, tag),
    };
    doc.set_text(node, text);
    node
}

fn find_or_append_descendant(doc: &mut Document, parent: NodeId, tag: &str) -> NodeId {
    match doc.find_descendant(parent, tag) {
        Some(node) => node,
        None => doc.append_element(parent, tag),
    }
}

fn remove_children(doc: &mut Document, parent: NodeId, tags: &[&str]) {
    let doomed: Vec<NodeId> = doc
        .child_elements(parent)
        .filter(|child| doc.name(*child).is_some_and(|name| tags.contains(&name)))
        .collect();
    for child in doomed {
        doc.remove_child(parent, child);
    }
}

fn display_name(doc: &Document, part: NodeId) -> String {
    part_name(doc, part).unwrap_or_else(|| "unnamed".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MatchKind;
    use crate::score::list_parts;
    use crate::testutil::{score_xml, score_xml_with};

    fn profiles() -> Profiles {
        Profiles::builtin().unwrap()
    }

    fn child_text(doc: &Document, parent: NodeId, tag: &str) -> Option<String> {
        doc.find_child(parent, tag).and_then(|node| doc.text(node))
    }

    fn part_named(doc: &Document, name: &str) -> NodeId {
        list_parts(doc)
            .unwrap()
            .into_iter()
            .find(|part| part.name() == name)
            .unwrap()
            .id()
    }

    fn volume_controllers(doc: &Document, part: NodeId) -> Vec<String> {
        doc.descendants_named(part, "controller")
            .into_iter()
            .filter(|c| doc.attribute(*c, "ctrl") == Some(VOLUME_CONTROLLER))
            .map(|c| doc.attribute(c, "value").unwrap_or_default().to_string())
            .collect()
    }

    fn program(doc: &Document, part: NodeId) -> Option<String> {
        doc.find_path(part, &["Channel", "program"])
            .and_then(|program| doc.attribute(program, "value"))
            .map(str::to_string)
    }

    #[test]
    fn test_highlight_rewrites_target() {
        let mut doc = Document::parse(&score_xml(&["Soprano", "Alto", "Tenor", "Bass"])).unwrap();
        let tenor = part_named(&doc, "Tenor");
        for name in ["Soprano", "Alto", "Bass"] {
            let part = part_named(&doc, name);
            let program = doc.find_path(part, &["Channel", "program"]).unwrap();
            doc.set_attribute(program, "value", "40");
        }

        let candidate = highlight(&mut doc, &profiles(), "tenor", &HighlightOptions::default())
            .unwrap();
        assert_eq!(candidate.part().id(), tenor);
        assert_eq!(candidate.kind(), MatchKind::Exact);

        let instrument = doc.find_descendant(tenor, "Instrument").unwrap();
        assert_eq!(doc.attribute(instrument, "id"), Some("tenor-saxophone"));
        assert_eq!(
            child_text(&doc, instrument, "longName").as_deref(),
            Some("Tenor Saxophone")
        );
        assert_eq!(child_text(&doc, instrument, "shortName").as_deref(), Some("T. Sax."));
        assert_eq!(
            child_text(&doc, instrument, "trackName").as_deref(),
            Some("Tenor Saxophone")
        );
        assert_eq!(child_text(&doc, instrument, "minPitchP").as_deref(), Some("44"));
        assert_eq!(child_text(&doc, instrument, "maxPitchA").as_deref(), Some("75"));
        assert_eq!(child_text(&doc, instrument, "transposeDiatonic").as_deref(), Some("-8"));
        assert_eq!(
            child_text(&doc, instrument, "transposeChromatic").as_deref(),
            Some("-14")
        );
        assert_eq!(
            child_text(&doc, instrument, "instrumentId").as_deref(),
            Some("wind.reed.saxophone.tenor")
        );
        assert_eq!(program(&doc, tenor).as_deref(), Some("66"));

        assert_eq!(volume_controllers(&doc, tenor), vec!["112"]);
        for name in ["Soprano", "Alto", "Bass"] {
            let part = part_named(&doc, name);
            assert_eq!(volume_controllers(&doc, part), vec!["60"], "{}", name);
            // Peers keep their own programs unless choir conversion is on.
            assert_eq!(program(&doc, part).as_deref(), Some("40"), "{}", name);
        }
    }

    #[test]
    fn test_unknown_voice_group_uses_bass_instrument() {
        let mut doc = Document::parse(&score_xml(&["Soprano", "Melody"])).unwrap();
        let candidate =
            highlight(&mut doc, &profiles(), "melo", &HighlightOptions::default()).unwrap();
        assert_eq!(candidate.part().name(), "Melody");
        assert_eq!(candidate.kind(), MatchKind::Heuristic);

        let instrument = doc.find_descendant(candidate.part().id(), "Instrument").unwrap();
        assert_eq!(doc.attribute(instrument, "id"), Some("baritone-saxophone"));
    }

    #[test]
    fn test_missing_nodes_are_synthesized() {
        let mut doc = Document::parse(
            r#"<museScore><Score>
                <Part><Staff id="1"/><Instrument><longName>Bass</longName></Instrument></Part>
                <Part><Staff id="2"/><Instrument><longName>Piano</longName></Instrument></Part>
              </Score></museScore>"#,
        )
        .unwrap();
        let bass = part_named(&doc, "Bass");
        let piano = part_named(&doc, "Piano");

        highlight(&mut doc, &profiles(), "bass", &HighlightOptions::default()).unwrap();

        let channel = doc.find_path(bass, &["Instrument", "Channel"]).unwrap();
        assert_eq!(program(&doc, bass).as_deref(), Some("67"));
        assert_eq!(child_text(&doc, channel, "synti").as_deref(), Some("Fluid"));
        assert_eq!(volume_controllers(&doc, bass), vec!["112"]);
        assert_eq!(volume_controllers(&doc, piano), vec!["60"]);
        assert_eq!(program(&doc, piano), None);
    }

    #[test]
    fn test_existing_synth_is_kept() {
        let xml = score_xml(&["Bass"]).replace("<synti>Fluid</synti>", "<synti>Zerberus</synti>");
        let mut doc = Document::parse(&xml).unwrap();
        let candidate =
            highlight(&mut doc, &profiles(), "bass", &HighlightOptions::default()).unwrap();
        let channel = doc
            .find_path(candidate.part().id(), &["Instrument", "Channel"])
            .unwrap();
        assert_eq!(child_text(&doc, channel, "synti").as_deref(), Some("Zerberus"));
    }

    #[test]
    fn test_instrument_created_under_staff() {
        let mut doc = Document::parse(
            r#"<museScore><Score>
                <Part><Staff id="1"/></Part>
                <Part><Instrument><longName>Piano</longName></Instrument></Part>
              </Score></museScore>"#,
        )
        .unwrap();
        let nameless = doc.descendants_named(doc.root(), PART_TAG)[0];
        let profiles = profiles();

        highlight_part(
            &mut doc,
            &profiles,
            nameless,
            profiles.highlight_for("alto"),
            &HighlightOptions::default(),
        )
        .unwrap();

        let instrument = doc.find_path(nameless, &["Staff", "Instrument"]).unwrap();
        assert_eq!(doc.attribute(instrument, "id"), Some("alto-saxophone"));
        assert_eq!(volume_controllers(&doc, nameless), vec!["112"]);
    }

    #[test]
    fn test_structural_failure_leaves_document_untouched() {
        let mut doc = Document::parse(
            r#"<museScore><Score>
                <Part/>
                <Part><Instrument><longName>Piano</longName></Instrument></Part>
              </Score></museScore>"#,
        )
        .unwrap();
        let before = doc.to_xml().unwrap();
        let empty = doc.descendants_named(doc.root(), PART_TAG)[0];
        let profiles = profiles();

        let result = highlight_part(
            &mut doc,
            &profiles,
            empty,
            profiles.highlight_for("bass"),
            &HighlightOptions::default(),
        );
        assert!(matches!(result, Err(Error::MutationFailed(_))));
        assert_eq!(doc.to_xml().unwrap(), before);
    }

    #[test]
    fn test_voice_not_found_leaves_document_untouched() {
        let mut doc =
            Document::parse(&score_xml(&["Soprano", "Baritone", "Contralto"])).unwrap();
        let before = doc.to_xml().unwrap();
        let result = highlight(&mut doc, &profiles(), "xyz123", &HighlightOptions::default());
        assert!(matches!(result, Err(Error::VoiceNotFound { .. })));
        assert_eq!(doc.to_xml().unwrap(), before);
    }

    #[test]
    fn test_highlight_is_idempotent() {
        let options = HighlightOptions {
            volume_boost: 20,
            master_volume: 45,
            use_choir: true,
        };
        let mut doc = Document::parse(&score_xml_with(&[
            ("Soprano", "voice.soprano"),
            ("Tenor", "voice.tenor"),
            ("Bass", "voice.bass"),
            ("Piano", "keyboard.piano"),
        ]))
        .unwrap();
        let profiles = profiles();

        highlight(&mut doc, &profiles, "bass", &options).unwrap();
        let once = doc.to_xml().unwrap();
        highlight(&mut doc, &profiles, "bass", &options).unwrap();
        let twice = doc.to_xml().unwrap();
        assert_eq!(once, twice);

        for part in doc.descendants_named(doc.root(), PART_TAG) {
            assert_eq!(doc.descendants_named(part, "Instrument").len(), 1);
            assert_eq!(doc.descendants_named(part, "Channel").len(), 1);
            assert_eq!(volume_controllers(&doc, part).len(), 1);
            let instrument = doc.find_descendant(part, "Instrument").unwrap();
            for tag in ["longName", "trackName", "instrumentId", "minPitchP"] {
                assert_eq!(
                    doc.child_elements(instrument)
                        .filter(|c| doc.name(*c) == Some(tag))
                        .count(),
                    1
                );
            }
        }
    }

    #[test]
    fn test_volume_clamping() {
        for (boost, expected) in [
            (-1000, "0"),
            (-100, "0"),
            (0, "100"),
            (27, "127"),
            (28, "127"),
            (i32::MAX, "127"),
            (i32::MIN, "0"),
        ] {
            let mut doc = Document::parse(&score_xml(&["Bass", "Tenor"])).unwrap();
            let options = HighlightOptions {
                volume_boost: boost,
                master_volume: boost,
                use_choir: false,
            };
            let candidate = highlight(&mut doc, &profiles(), "bass", &options).unwrap();
            assert_eq!(
                volume_controllers(&doc, candidate.part().id()),
                vec![expected],
                "boost {}",
                boost
            );
        }

        for (master, expected) in [(-5, "0"), (0, "0"), (60, "60"), (127, "127"), (500, "127")] {
            let mut doc = Document::parse(&score_xml(&["Bass", "Tenor"])).unwrap();
            let options = HighlightOptions {
                master_volume: master,
                ..HighlightOptions::default()
            };
            highlight(&mut doc, &profiles(), "bass", &options).unwrap();
            assert_eq!(
                volume_controllers(&doc, part_named(&doc, "Tenor")),
                vec![expected]
            );
        }
    }

    #[test]
    fn test_existing_volume_controller_is_updated() {
        let xml = score_xml(&["Bass", "Tenor"]).replace(
            "<synti>Fluid</synti>",
            r#"<controller ctrl="10" value="64"/><controller ctrl="7" value="90"/><synti>Fluid</synti>"#,
        );
        let mut doc = Document::parse(&xml).unwrap();
        highlight(&mut doc, &profiles(), "bass", &HighlightOptions::default()).unwrap();

        let tenor = part_named(&doc, "Tenor");
        assert_eq!(volume_controllers(&doc, tenor), vec!["60"]);
        let pan = doc
            .descendants_named(tenor, "controller")
            .into_iter()
            .find(|c| doc.attribute(*c, "ctrl") == Some("10"))
            .unwrap();
        assert_eq!(doc.attribute(pan, "value"), Some("64"));
    }

    #[test]
    fn test_choir_conversion() {
        let xml = score_xml_with(&[
            ("Bass", "voice.bass"),
            ("Tenor", "voice.tenor"),
            ("Yodel", "voice.yodeler"),
            ("Piano", "keyboard.piano"),
        ])
        .replace(
            "<instrumentId>voice.tenor</instrumentId>",
            "<instrumentId>voice.tenor</instrumentId>\
             <transposeDiatonic>-7</transposeDiatonic>\
             <transposeChromatic>-12</transposeChromatic>\
             <concertClef>F</concertClef>\
             <transposingClef>G8vb</transposingClef>",
        );
        let mut doc = Document::parse(&xml).unwrap();
        let tenor = part_named(&doc, "Tenor");
        let yodel = part_named(&doc, "Yodel");
        let piano = part_named(&doc, "Piano");
        let program_of = |doc: &Document, part| program(doc, part);
        let set_program_40 = |doc: &mut Document, part: NodeId| {
            let program = doc.find_path(part, &["Channel", "program"]).unwrap();
            doc.set_attribute(program, "value", "40");
        };
        set_program_40(&mut doc, tenor);
        set_program_40(&mut doc, yodel);
        set_program_40(&mut doc, piano);

        let options = HighlightOptions {
            use_choir: true,
            ..HighlightOptions::default()
        };
        highlight(&mut doc, &profiles(), "bass", &options).unwrap();

        let instrument = doc.find_descendant(tenor, "Instrument").unwrap();
        for tag in TRANSPOSITION_TAGS {
            assert!(doc.find_child(instrument, tag).is_none(), "{} remains", tag);
        }
        assert_eq!(
            child_text(&doc, instrument, "glissandoStyle").as_deref(),
            Some("portamento")
        );
        assert_eq!(child_text(&doc, instrument, "clef").as_deref(), Some("G8vb"));
        assert_eq!(child_text(&doc, instrument, "longName").as_deref(), Some("Tenor"));
        assert_eq!(doc.attribute(instrument, "id"), Some("tenor"));
        assert_eq!(program_of(&doc, tenor).as_deref(), Some("52"));
        assert_eq!(volume_controllers(&doc, tenor), vec!["60"]);

        // Unknown voices and instruments keep their programs.
        assert_eq!(program_of(&doc, yodel).as_deref(), Some("40"));
        assert_eq!(program_of(&doc, piano).as_deref(), Some("40"));
        let piano_instrument = doc.find_descendant(piano, "Instrument").unwrap();
        assert!(doc.find_child(piano_instrument, "glissandoStyle").is_none());

        // The highlighted part is never converted.
        let bass = part_named(&doc, "Baritone Saxophone");
        assert_eq!(program_of(&doc, bass).as_deref(), Some("67"));
    }
}
