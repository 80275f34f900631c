// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
use std::collections::HashSet;

use thiserror::Error;

/// The default MIDI source to subscribe to.
pub const DEFAULT_PORTSPEC: &str = "rtpmidi:0";

/// The default GPIO chip holding the output lines.
pub const DEFAULT_CHIP: &str = "gpiochip0";

/// The default note to line mappings.
pub const DEFAULT_MAPPINGS: &str = "60=25,62=26,64=27";

/// Typed error for command line configuration failures so callers can
/// distinguish e.g. a malformed mapping from an out of range note.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A mapping entry was not of the form <NOTE>=<LINE>.
    #[error("Malformed note mapping '{0}', expected <NOTE>=<LINE>")]
    MalformedMapping(String),

    /// A note could not be parsed or is outside the MIDI note range.
    #[error("Invalid note number '{0}'")]
    InvalidNote(String),

    /// A line offset could not be parsed.
    #[error("Invalid line offset '{0}'")]
    InvalidLine(String),

    /// The same note was mapped more than once.
    #[error("Note {0} is mapped more than once")]
    DuplicateNote(u8),

    /// The same line was mapped more than once.
    #[error("Line {0} is mapped more than once")]
    DuplicateLine(u32),
}

/// A single note to output line mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteMapping {
    /// The MIDI note number.
    note: u8,

    /// The line offset on the GPIO chip.
    line: u32,
}

impl NoteMapping {
    /// Creates a new note mapping.
    pub fn new(note: u8, line: u32) -> NoteMapping {
        NoteMapping { note, line }
    }

    /// Returns the MIDI note number.
    pub fn note(&self) -> u8 {
        self.note
    }

    /// Returns the line offset.
    pub fn line(&self) -> u32 {
        self.line
    }
}

/// The bridge configuration assembled from the command line.
pub struct Config {
    /// The MIDI source to subscribe to.
    portspec: String,

    /// The GPIO chip with the output lines.
    chip: String,

    /// The note to line mappings.
    mappings: Vec<NoteMapping>,
}

impl Config {
    /// Creates a new configuration, validating the note mappings.
    pub fn new(portspec: &str, chip: &str, map: &str) -> Result<Config, ConfigError> {
        Ok(Config {
            portspec: portspec.to_string(),
            chip: chip.to_string(),
            mappings: parse_mappings(map)?,
        })
    }

    /// Returns the portspec of the MIDI source.
    pub fn portspec(&self) -> &str {
        &self.portspec
    }

    /// Returns the name of the GPIO chip.
    pub fn chip(&self) -> &str {
        &self.chip
    }

    /// Returns the note to line mappings.
    pub fn mappings(&self) -> &[NoteMapping] {
        &self.mappings
    }
}

/// Parses note mappings. Should be in the form <NOTE>=<LINE>,<NOTE>=<LINE>.
pub fn parse_mappings(map: &str) -> Result<Vec<NoteMapping>, ConfigError> {
    let mut mappings: Vec<NoteMapping> = Vec::new();
    let mut notes: HashSet<u8> = HashSet::new();
    let mut lines: HashSet<u32> = HashSet::new();

    for mapping in map.split(',') {
        let note_and_line: Vec<&str> = mapping.split('=').collect();
        if note_and_line.len() != 2 {
            return Err(ConfigError::MalformedMapping(mapping.to_string()));
        }

        let note: u8 = note_and_line[0]
            .parse()
            .map_err(|_| ConfigError::InvalidNote(note_and_line[0].to_string()))?;
        if note > 127 {
            return Err(ConfigError::InvalidNote(note_and_line[0].to_string()));
        }
        let line: u32 = note_and_line[1]
            .parse()
            .map_err(|_| ConfigError::InvalidLine(note_and_line[1].to_string()))?;

        if !notes.insert(note) {
            return Err(ConfigError::DuplicateNote(note));
        }
        if !lines.insert(line) {
            return Err(ConfigError::DuplicateLine(line));
        }
        mappings.push(NoteMapping::new(note, line));
    }

    Ok(mappings)
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::{parse_mappings, Config, ConfigError, NoteMapping};

    #[test]
    fn parse_default_mappings() -> Result<(), Box<dyn Error>> {
        let mappings = parse_mappings(super::DEFAULT_MAPPINGS)?;

        assert_eq!(
            mappings,
            vec![
                NoteMapping::new(60, 25),
                NoteMapping::new(62, 26),
                NoteMapping::new(64, 27),
            ]
        );
        Ok(())
    }

    #[test]
    fn parse_single_mapping() -> Result<(), Box<dyn Error>> {
        let mappings = parse_mappings("36=17")?;

        assert_eq!(mappings, vec![NoteMapping::new(36, 17)]);
        Ok(())
    }

    #[test]
    fn malformed_mappings_are_rejected() {
        for map in ["", "60", "60-25", "60=25=3", "60=25,"] {
            assert!(
                matches!(parse_mappings(map), Err(ConfigError::MalformedMapping(_))),
                "expected '{}' to be malformed",
                map
            );
        }
    }

    #[test]
    fn invalid_notes_are_rejected() {
        for map in ["abc=25", "300=25", "-1=25", "128=25", "=25"] {
            assert!(
                matches!(parse_mappings(map), Err(ConfigError::InvalidNote(_))),
                "expected '{}' to have an invalid note",
                map
            );
        }
    }

    #[test]
    fn invalid_lines_are_rejected() {
        assert!(matches!(
            parse_mappings("60=x"),
            Err(ConfigError::InvalidLine(_))
        ));
        assert!(matches!(
            parse_mappings("60=-2"),
            Err(ConfigError::InvalidLine(_))
        ));
    }

    #[test]
    fn duplicate_notes_are_rejected() {
        assert!(matches!(
            parse_mappings("60=25,60=26"),
            Err(ConfigError::DuplicateNote(60))
        ));
    }

    #[test]
    fn duplicate_lines_are_rejected() {
        assert!(matches!(
            parse_mappings("60=25,62=25"),
            Err(ConfigError::DuplicateLine(25))
        ));
    }

    #[test]
    fn config_exposes_validated_values() -> Result<(), Box<dyn Error>> {
        let config = Config::new("20:0", "gpiochip1", "60=25")?;

        assert_eq!(config.portspec(), "20:0");
        assert_eq!(config.chip(), "gpiochip1");
        assert_eq!(config.mappings(), &[NoteMapping::new(60, 25)]);
        Ok(())
    }
}
