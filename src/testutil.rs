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
    error::Error,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use quick_xml::escape::escape;
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::render::Renderer;

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container>
  <rootfiles>
    <rootfile full-path="score.mscx"/>
  </rootfiles>
</container>
"#;

/// Bytes stored as the package thumbnail. Only their survival through repackaging matters.
pub const THUMBNAIL: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];

/// Builds a score document with one vocal part per name.
pub fn score_xml(names: &[&str]) -> String {
    let parts: Vec<(&str, &str)> = names.iter().map(|name| (*name, "voice.vocals")).collect();
    score_xml_with(&parts)
}

/// Builds a score document with one part per (name, instrument id) pair, laid out the way
/// MuseScore 4 writes them.
pub fn score_xml_with(parts: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <museScore version=\"4.20\">\n  \
         <programVersion>4.2.1</programVersion>\n  \
         <Score>\n    \
         <Division>480</Division>\n",
    );

    for (index, &(name, instrument_id)) in parts.iter().enumerate() {
        let name = escape(name);
        let short_id = instrument_id.rsplit('.').next().unwrap_or(instrument_id);
        xml.push_str(&format!(
            r#"    <Part id="{number}">
      <Staff id="{number}">
        <StaffType group="pitched">
          <name>stdNormal</name>
          </StaffType>
        </Staff>
      <trackName>{name}</trackName>
      <Instrument id="{short_id}">
        <longName>{name}</longName>
        <shortName>{name}</shortName>
        <trackName>{name}</trackName>
        <minPitchP>41</minPitchP>
        <maxPitchP>84</maxPitchP>
        <minPitchA>48</minPitchA>
        <maxPitchA>79</maxPitchA>
        <instrumentId>{instrument_id}</instrumentId>
        <clef>G</clef>
        <Channel>
          <program value="52"/>
          <synti>Fluid</synti>
          </Channel>
        </Instrument>
      </Part>
"#,
            number = index + 1,
        ));
    }

    for index in 0..parts.len() {
        xml.push_str(&format!(
            r#"    <Staff id="{}">
      <Measure>
        <voice>
          <Chord>
            <durationType>whole</durationType>
            <Note><pitch>60</pitch><tpc>14</tpc></Note>
            </Chord>
          </voice>
        </Measure>
      </Staff>
"#,
            index + 1
        ));
    }

    xml.push_str("    </Score>\n  </museScore>\n");
    xml
}

/// Writes a score package to `dir` with the score document stored under `member`, along with
/// the container manifest, a thumbnail and audio settings.
pub fn write_mscz(
    dir: &Path,
    file_name: &str,
    member: &str,
    xml: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(file_name);
    let mut zip = ZipWriter::new(File::create(&path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("META-INF/container.xml", options)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;
    zip.start_file(member, options)?;
    zip.write_all(xml.as_bytes())?;
    zip.start_file("Thumbnails/thumbnail.png", options)?;
    zip.write_all(THUMBNAIL)?;
    zip.start_file("audiosettings.json", options)?;
    zip.write_all(br#"{"activeAudioTracks": []}"#)?;
    zip.finish()?;

    Ok(path)
}

/// Reads a single member of a zip archive as bytes.
pub fn read_member(archive: &Path, member: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut archive = ZipArchive::new(File::open(archive)?)?;
    let mut file = archive.by_name(member)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}

/// Lists the member names of a zip archive.
pub fn member_names(archive: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let archive = ZipArchive::new(File::open(archive)?)?;
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    Ok(names)
}

/// A renderer that never leaves the process. Each "rendering" is the score document found in
/// the input package, written out verbatim so tests can inspect what would have been played.
#[derive(Default)]
pub struct MockRenderer {
    calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    fail: bool,
}

impl MockRenderer {
    /// A renderer that rejects every input.
    pub fn failing() -> MockRenderer {
        MockRenderer {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// The (input, output) pairs this renderer has been asked for, in order.
    pub fn calls(&self) -> Vec<(PathBuf, PathBuf)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn write_score(input: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
        let mut archive = ZipArchive::new(File::open(input)?)?;
        let member = archive
            .file_names()
            .find(|name| name.ends_with(".mscx"))
            .map(str::to_string)
            .ok_or("no score in package")?;
        let mut xml = String::new();
        archive.by_name(&member)?.read_to_string(&mut xml)?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, xml)?;
        Ok(())
    }
}

impl Renderer for MockRenderer {
    async fn render(&self, input: &Path, output: &Path) -> crate::Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((input.to_path_buf(), output.to_path_buf()));
        }
        if self.fail {
            return Err(crate::Error::RenderFailed("mock renderer failure".to_string()));
        }
        Self::write_score(input, output)
            .map_err(|e| crate::Error::RenderFailed(e.to_string()))
    }
}
