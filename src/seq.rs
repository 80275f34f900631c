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
use std::ffi::CStr;

use alsa::seq::{
    Addr, ClientIter, Connect, EvNote, Event, EventType, PortCap, PortSubscribe, PortType, Seq,
};
use alsa::{poll, Direction, PollDescriptors};
use thiserror::Error;

/// The name this program registers under with the sequencer.
const CLIENT_NAME: &CStr = c"mgpio";

/// Typed error for fatal sequencer failures during setup and the main wait.
#[derive(Debug, Error)]
pub enum SeqError {
    /// The sequencer could not be opened.
    #[error("Unable to open sequencer: {0}")]
    Open(alsa::Error),

    /// The client name could not be set.
    #[error("Unable to set client name: {0}")]
    ClientName(alsa::Error),

    /// The input port could not be created.
    #[error("Unable to create input port: {0}")]
    CreatePort(alsa::Error),

    /// The system announce port could not be subscribed.
    #[error("Unable to subscribe to system announcements: {0}")]
    Announce(alsa::Error),

    /// The wait for input failed.
    #[error("Error while waiting for sequencer input: {0}")]
    Poll(alsa::Error),

    /// An event could not be read from the input queue.
    #[error("Error reading sequencer event: {0}")]
    Read(alsa::Error),
}

/// Typed error for attach attempts. The source may legitimately not exist
/// yet, so these are never fatal.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The portspec did not resolve to a sequencer address.
    #[error("No sequencer address matches '{0}'")]
    Resolve(String),

    /// The sequencer refused the subscription.
    #[error("Unable to subscribe to '{spec}': {err}")]
    Subscribe { spec: String, err: alsa::Error },
}

impl AttachError {
    /// Returns true if the failure was a duplicate subscription, which the
    /// sequencer reports as busy.
    pub fn is_already_subscribed(&self) -> bool {
        match self {
            AttachError::Subscribe { err, .. } => err.errno() == libc::EBUSY,
            AttachError::Resolve(_) => false,
        }
    }
}

/// Requests event delivery from MIDI sources into an input port.
pub trait Connector {
    /// Attempts to subscribe the source named by the portspec into the input
    /// port, returning the resolved source address. Callers retry this
    /// unconditionally; earlier outcomes are never consulted.
    fn attach(&self, spec: &str) -> Result<Addr, AttachError>;
}

/// The bridge's input feed: blocking waits and queued event reads.
pub trait EventSource {
    /// Blocks until input is ready. A signal interruption counts as an
    /// ordinary wake so the caller gets to check its stop flag.
    fn wait(&self) -> Result<(), SeqError>;

    /// Reads one queued event, if any. Returns None once the queue is
    /// drained.
    fn read_event(&self) -> Result<Option<SeqEvent>, SeqError>;
}

/// A sequencer event translated into the cases the bridge acts on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeqEvent {
    /// A key was pressed on the source.
    NoteOn {
        source: Addr,
        channel: u8,
        note: u8,
        velocity: u8,
    },
    /// A key was released on the source.
    NoteOff {
        source: Addr,
        channel: u8,
        note: u8,
        velocity: u8,
    },
    /// A client appeared in the system.
    ClientStart { client: i32 },
    /// A client left the system.
    ClientExit { client: i32 },
    /// A client changed its properties.
    ClientChange { client: i32 },
    /// A port appeared in the system.
    PortStart { addr: Addr },
    /// A port left the system.
    PortExit { addr: Addr },
    /// A port changed its properties.
    PortChange { addr: Addr },
    /// A subscription was established somewhere in the system.
    PortSubscribed { sender: Addr, dest: Addr },
    /// A subscription was dropped somewhere in the system.
    PortUnsubscribed { sender: Addr, dest: Addr },
    /// An event kind the bridge does not act on.
    Other { kind: EventType },
}

impl SeqEvent {
    /// Translates a raw sequencer event. The velocity of note events is
    /// carried through untouched.
    fn from_raw(event: &Event) -> SeqEvent {
        let kind = event.get_type();
        let translated = match kind {
            EventType::Noteon => event.get_data::<EvNote>().map(|note| SeqEvent::NoteOn {
                source: event.get_source(),
                channel: note.channel,
                note: note.note,
                velocity: note.velocity,
            }),
            EventType::Noteoff => event.get_data::<EvNote>().map(|note| SeqEvent::NoteOff {
                source: event.get_source(),
                channel: note.channel,
                note: note.note,
                velocity: note.velocity,
            }),
            EventType::ClientStart => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::ClientStart { client: addr.client }),
            EventType::ClientExit => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::ClientExit { client: addr.client }),
            EventType::ClientChange => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::ClientChange { client: addr.client }),
            EventType::PortStart => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::PortStart { addr }),
            EventType::PortExit => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::PortExit { addr }),
            EventType::PortChange => event
                .get_data::<Addr>()
                .map(|addr| SeqEvent::PortChange { addr }),
            EventType::PortSubscribed => {
                event
                    .get_data::<Connect>()
                    .map(|connect| SeqEvent::PortSubscribed {
                        sender: connect.sender,
                        dest: connect.dest,
                    })
            }
            EventType::PortUnsubscribed => {
                event
                    .get_data::<Connect>()
                    .map(|connect| SeqEvent::PortUnsubscribed {
                        sender: connect.sender,
                        dest: connect.dest,
                    })
            }
            _ => None,
        };

        translated.unwrap_or(SeqEvent::Other { kind })
    }
}

/// The program's endpoint into the ALSA sequencer.
pub struct Sequencer {
    seq: Seq,
    client: i32,
    port: i32,
}

impl Sequencer {
    /// Opens a duplex, non-blocking sequencer handle, names the client and
    /// creates the input port.
    pub fn open() -> Result<Sequencer, SeqError> {
        let seq = Seq::open(None, None, true).map_err(SeqError::Open)?;
        seq.set_client_name(CLIENT_NAME)
            .map_err(SeqError::ClientName)?;
        let port = seq
            .create_simple_port(
                CLIENT_NAME,
                PortCap::READ | PortCap::WRITE | PortCap::SUBS_READ | PortCap::SUBS_WRITE,
                PortType::MIDI_GENERIC,
            )
            .map_err(SeqError::CreatePort)?;
        let client = seq.client_id().map_err(SeqError::Open)?;

        Ok(Sequencer { seq, client, port })
    }

    /// Returns the sequencer address of the input port.
    pub fn addr(&self) -> Addr {
        Addr {
            client: self.client,
            port: self.port,
        }
    }

    /// Subscribes the system announce port into the input port so client and
    /// port lifecycle events are delivered alongside MIDI events.
    pub fn subscribe_announcements(&self) -> Result<(), SeqError> {
        let sub = PortSubscribe::empty().map_err(SeqError::Announce)?;
        sub.set_sender(Addr::system_announce());
        sub.set_dest(self.addr());
        self.seq.subscribe_port(&sub).map_err(SeqError::Announce)
    }

    /// Resolves a portspec against the current client list.
    fn resolve(&self, spec: &str) -> Option<Addr> {
        match parse_spec(spec)? {
            SpecTarget::Numeric(addr) => Some(addr),
            SpecTarget::Named { name, port } => ClientIter::new(&self.seq)
                .find(|client| {
                    client
                        .get_name()
                        .map(|n| client_matches(n, name))
                        .unwrap_or(false)
                })
                .map(|client| Addr {
                    client: client.get_client(),
                    port,
                }),
        }
    }
}

impl Connector for Sequencer {
    fn attach(&self, spec: &str) -> Result<Addr, AttachError> {
        let source = self
            .resolve(spec)
            .ok_or_else(|| AttachError::Resolve(spec.to_string()))?;
        let sub = PortSubscribe::empty().map_err(|err| AttachError::Subscribe {
            spec: spec.to_string(),
            err,
        })?;
        sub.set_sender(source);
        sub.set_dest(self.addr());
        self.seq
            .subscribe_port(&sub)
            .map_err(|err| AttachError::Subscribe {
                spec: spec.to_string(),
                err,
            })?;

        Ok(source)
    }
}

impl EventSource for Sequencer {
    fn wait(&self) -> Result<(), SeqError> {
        let mut fds = (&self.seq, Some(Direction::Capture))
            .get()
            .map_err(SeqError::Poll)?;
        match poll::poll(&mut fds, -1) {
            Ok(_) => Ok(()),
            Err(e) if interrupted(&e) => Ok(()),
            Err(e) => Err(SeqError::Poll(e)),
        }
    }

    fn read_event(&self) -> Result<Option<SeqEvent>, SeqError> {
        let mut input = self.seq.input();
        match input.event_input() {
            Ok(event) => Ok(Some(SeqEvent::from_raw(&event))),
            Err(e) if e.errno() == libc::EAGAIN => Ok(None),
            Err(e) => Err(SeqError::Read(e)),
        }
    }
}

/// True if a poll failure was a signal interruption. The poll wrapper
/// reports errno negated, unlike the seq calls, so match either sign.
fn interrupted(e: &alsa::Error) -> bool {
    e.errno().abs() == libc::EINTR
}

/// A portspec with the client part parsed but not yet resolved.
#[derive(Debug, PartialEq)]
enum SpecTarget<'a> {
    /// The client was given numerically. No existence check is performed;
    /// subscribing to an absent client fails instead.
    Numeric(Addr),
    /// The client was given by name and needs a lookup.
    Named { name: &'a str, port: i32 },
}

/// Splits a portspec at the first ':' or '.' into its client and port parts.
/// A missing port part means port 0.
fn parse_spec(spec: &str) -> Option<SpecTarget<'_>> {
    let (client, port) = match spec.find(|c| c == ':' || c == '.') {
        Some(at) => (&spec[..at], &spec[at + 1..]),
        None => (spec, ""),
    };

    let port: i32 = if port.is_empty() { 0 } else { port.parse().ok()? };
    if port < 0 || client.is_empty() {
        return None;
    }

    if client.starts_with(|c: char| c.is_ascii_digit()) {
        let client: i32 = client.parse().ok()?;
        Some(SpecTarget::Numeric(Addr { client, port }))
    } else {
        Some(SpecTarget::Named { name: client, port })
    }
}

/// Matches a client name against the wanted name the way the sequencer's
/// address parsing does: an exact match, or a case insensitive prefix
/// followed by a space.
fn client_matches(name: &str, wanted: &str) -> bool {
    if name == wanted {
        return true;
    }
    match name.get(..wanted.len()) {
        Some(prefix) => {
            prefix.eq_ignore_ascii_case(wanted) && name[wanted.len()..].starts_with(' ')
        }
        None => false,
    }
}
