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
use std::{collections::HashMap, fmt};

use tracing::{debug, info, warn};

use crate::config::NoteMapping;
use crate::gpio::{Bank, LineState};
use crate::seq::{Connector, SeqEvent};

/// The static table from MIDI note numbers to GPIO line offsets.
pub struct NoteMap {
    lines: HashMap<u8, u32>,
}

impl NoteMap {
    /// Builds the map from the configured mappings.
    pub fn new(mappings: &[NoteMapping]) -> NoteMap {
        NoteMap {
            lines: mappings
                .iter()
                .map(|mapping| (mapping.note(), mapping.line()))
                .collect(),
        }
    }

    /// Returns the line for the note, if the note is mapped.
    pub fn line_for(&self, note: u8) -> Option<u32> {
        self.lines.get(&note).copied()
    }
}

impl fmt::Display for NoteMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mappings: Vec<(u8, u32)> =
            self.lines.iter().map(|(note, line)| (*note, *line)).collect();
        mappings.sort();

        let formatted: Vec<String> = mappings
            .iter()
            .map(|(note, line)| format!("{}={}", note, line))
            .collect();
        write!(f, "{}", formatted.join(","))
    }
}

/// Routes sequencer events to the output bank and retries the source
/// connection on discovery events.
pub struct Router {
    /// The note map.
    map: NoteMap,

    /// The MIDI source to subscribe to.
    portspec: String,
}

impl Router {
    /// Creates a new router targeting the given portspec.
    pub fn new(map: NoteMap, portspec: &str) -> Router {
        Router {
            map,
            portspec: portspec.to_string(),
        }
    }

    /// Returns the note map.
    pub fn map(&self) -> &NoteMap {
        &self.map
    }

    /// Attempts to attach the configured MIDI source to the input port.
    /// Failure leaves the program running; discovery events retry this.
    pub fn attach(&self, connector: &dyn Connector) {
        match connector.attach(&self.portspec) {
            Ok(source) => info!(
                portspec = self.portspec,
                client = source.client,
                port = source.port,
                "Connected MIDI source."
            ),
            Err(e) if e.is_already_subscribed() => {
                debug!(portspec = self.portspec, "MIDI source already connected.")
            }
            Err(e) => info!(
                err = e.to_string(),
                portspec = self.portspec,
                "MIDI source not available, will retry on discovery."
            ),
        }
    }

    /// Classifies one event and performs its side effects. Note events write
    /// to the bank through the note map; discovery events retry the source
    /// connection regardless of which client or port appeared.
    pub fn route(&self, event: &SeqEvent, connector: &dyn Connector, bank: &dyn Bank) {
        match *event {
            SeqEvent::NoteOn {
                channel,
                note,
                velocity,
                ..
            } => {
                // A note on with zero velocity is a note off by MIDI convention.
                let state = if velocity == 0 {
                    LineState::Off
                } else {
                    LineState::On
                };
                self.set_line(channel, note, state, bank);
            }
            SeqEvent::NoteOff { channel, note, .. } => {
                self.set_line(channel, note, LineState::Off, bank)
            }
            SeqEvent::ClientStart { client } => {
                debug!(client, "Client appeared.");
                self.attach(connector);
            }
            SeqEvent::PortStart { addr } => {
                debug!(client = addr.client, port = addr.port, "Port appeared.");
                self.attach(connector);
            }
            SeqEvent::ClientExit { client } => debug!(client, "Client exited."),
            SeqEvent::ClientChange { client } => debug!(client, "Client changed."),
            SeqEvent::PortExit { addr } => {
                debug!(client = addr.client, port = addr.port, "Port exited.")
            }
            SeqEvent::PortChange { addr } => {
                debug!(client = addr.client, port = addr.port, "Port changed.")
            }
            SeqEvent::PortSubscribed { sender, dest } => debug!(
                sender = format!("{}:{}", sender.client, sender.port),
                dest = format!("{}:{}", dest.client, dest.port),
                "Ports subscribed."
            ),
            SeqEvent::PortUnsubscribed { sender, dest } => debug!(
                sender = format!("{}:{}", sender.client, sender.port),
                dest = format!("{}:{}", dest.client, dest.port),
                "Ports unsubscribed."
            ),
            SeqEvent::Other { kind } => {
                debug!(kind = format!("{:?}", kind), "Ignoring sequencer event.")
            }
        }
    }

    /// Writes the mapped line for the note. Unmapped notes have no effect and
    /// write failures do not stop event processing.
    fn set_line(&self, channel: u8, note: u8, state: LineState, bank: &dyn Bank) {
        match self.map.line_for(note) {
            Some(line) => {
                debug!(channel, note, line, state = state.to_string(), "Setting line.");
                if let Err(e) = bank.set(line, state) {
                    warn!(err = e.to_string(), line, "Unable to write to output line.");
                }
            }
            None => debug!(channel, note, "Ignoring unmapped note."),
        }
    }
}
