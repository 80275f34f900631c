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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, error, info, warn};

use crate::gpio::Bank;
use crate::router::Router;
use crate::seq::{Connector, EventSource};

/// Drives the poll loop, feeding sequencer events through the router until a
/// stop is requested or the sequencer fails.
pub struct Bridge<S> {
    /// The sequencer endpoint.
    seq: S,

    /// The GPIO output bank.
    bank: Box<dyn Bank>,

    /// The event router.
    router: Router,

    /// Set by the signal handler to request a stop.
    stop: Arc<AtomicBool>,
}

impl<S: EventSource + Connector> Bridge<S> {
    /// Creates a new bridge.
    pub fn new(seq: S, bank: Box<dyn Bank>, router: Router, stop: Arc<AtomicBool>) -> Bridge<S> {
        Bridge {
            seq,
            bank,
            router,
            stop,
        }
    }

    /// Runs until a stop is requested or waiting on the sequencer fails.
    /// Buffered events are drained before every stop check, so events that
    /// arrive alongside a signal are still routed.
    pub fn run(&self) {
        info!(
            bank = self.bank.to_string(),
            lines = format!("{:?}", self.bank.lines()),
            "Bridging MIDI events to GPIO lines."
        );

        while !self.stop.load(Ordering::Relaxed) {
            if let Err(e) = self.seq.wait() {
                error!(
                    err = e.to_string(),
                    "Error while waiting for sequencer events."
                );
                break;
            }
            self.drain();
        }

        info!("Bridge stopped.");
    }

    /// Routes every buffered event until the input queue is empty.
    fn drain(&self) {
        loop {
            match self.seq.read_event() {
                Ok(Some(event)) => {
                    debug!(event = format!("{:?}", event), "Received sequencer event.");
                    self.router.route(&event, &self.seq, self.bank.as_ref());
                }
                Ok(None) => return,
                Err(e) => {
                    warn!(err = e.to_string(), "Error reading sequencer event.");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::error::Error;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    use alsa::seq::Addr;

    use crate::config::parse_mappings;
    use crate::gpio::test::Bank as MockBank;
    use crate::gpio::LineState;
    use crate::router::{NoteMap, Router};
    use crate::seq::{AttachError, Connector, EventSource, SeqError, SeqEvent};

    use super::Bridge;

    /// One scripted wait on the mock source.
    struct WaitStep {
        result: Result<(), SeqError>,
        stop: bool,
    }

    /// A scripted event source standing in for the sequencer.
    #[derive(Clone)]
    struct MockSource {
        stop: Arc<AtomicBool>,
        waits: Arc<Mutex<VecDeque<WaitStep>>>,
        reads: Arc<Mutex<VecDeque<Result<Option<SeqEvent>, SeqError>>>>,
        specs: Arc<Mutex<Vec<String>>>,
    }

    impl MockSource {
        fn new(stop: Arc<AtomicBool>) -> MockSource {
            MockSource {
                stop,
                waits: Arc::new(Mutex::new(VecDeque::new())),
                reads: Arc::new(Mutex::new(VecDeque::new())),
                specs: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Scripts a wake delivering the given events.
        fn wake(&self, events: &[SeqEvent]) {
            let mut reads: Vec<Result<Option<SeqEvent>, SeqError>> =
                events.iter().map(|event| Ok(Some(*event))).collect();
            reads.push(Ok(None));
            self.wake_with(reads, false);
        }

        /// Scripts a wake that also sets the stop flag, the way a signal
        /// arriving while blocked does.
        fn wake_and_stop(&self, events: &[SeqEvent]) {
            let mut reads: Vec<Result<Option<SeqEvent>, SeqError>> =
                events.iter().map(|event| Ok(Some(*event))).collect();
            reads.push(Ok(None));
            self.wake_with(reads, true);
        }

        /// Scripts a wake with explicit read results.
        fn wake_with(&self, results: Vec<Result<Option<SeqEvent>, SeqError>>, stop: bool) {
            self.waits
                .lock()
                .expect("unable to get waits lock")
                .push_back(WaitStep {
                    result: Ok(()),
                    stop,
                });
            self.reads
                .lock()
                .expect("unable to get reads lock")
                .extend(results);
        }

        /// Scripts a failing wait.
        fn fail_wait(&self) {
            self.waits
                .lock()
                .expect("unable to get waits lock")
                .push_back(WaitStep {
                    result: Err(SeqError::Poll(alsa::Error::new("poll", -libc::EBADF))),
                    stop: false,
                });
        }

        /// Returns every attach attempt, in order.
        fn specs(&self) -> Vec<String> {
            self.specs.lock().expect("unable to get specs lock").clone()
        }
    }

    impl EventSource for MockSource {
        fn wait(&self) -> Result<(), SeqError> {
            // An exhausted script requests a stop instead of blocking forever.
            let step = self
                .waits
                .lock()
                .expect("unable to get waits lock")
                .pop_front()
                .unwrap_or(WaitStep {
                    result: Ok(()),
                    stop: true,
                });
            if step.stop {
                self.stop.store(true, Ordering::Relaxed);
            }
            step.result
        }

        fn read_event(&self) -> Result<Option<SeqEvent>, SeqError> {
            self.reads
                .lock()
                .expect("unable to get reads lock")
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    impl Connector for MockSource {
        fn attach(&self, spec: &str) -> Result<Addr, AttachError> {
            self.specs
                .lock()
                .expect("unable to get specs lock")
                .push(spec.to_string());
            Ok(Addr {
                client: 129,
                port: 0,
            })
        }
    }

    fn note_on(note: u8, velocity: u8) -> SeqEvent {
        SeqEvent::NoteOn {
            source: Addr {
                client: 129,
                port: 0,
            },
            channel: 0,
            note,
            velocity,
        }
    }

    fn test_bridge(
        source: MockSource,
        bank: &MockBank,
        stop: Arc<AtomicBool>,
    ) -> Result<Bridge<MockSource>, Box<dyn Error>> {
        let router = Router::new(
            NoteMap::new(&parse_mappings("60=25,62=26,64=27")?),
            "rtpmidi:0",
        );
        Ok(Bridge::new(source, Box::new(bank.clone()), router, stop))
    }

    #[test]
    fn events_arriving_with_a_stop_are_still_drained() -> Result<(), Box<dyn Error>> {
        let stop = Arc::new(AtomicBool::new(false));
        let bank = MockBank::new("mock-bank", &[25, 26, 27]);
        let source = MockSource::new(Arc::clone(&stop));
        source.wake_and_stop(&[note_on(60, 100), note_on(60, 0)]);

        test_bridge(source, &bank, stop)?.run();

        assert_eq!(
            bank.writes(),
            vec![(25, LineState::On), (25, LineState::Off)]
        );
        Ok(())
    }

    #[test]
    fn empty_wakes_keep_the_loop_running() -> Result<(), Box<dyn Error>> {
        let stop = Arc::new(AtomicBool::new(false));
        let bank = MockBank::new("mock-bank", &[25, 26, 27]);
        let source = MockSource::new(Arc::clone(&stop));
        source.wake(&[]);
        source.wake(&[]);
        source.wake_and_stop(&[note_on(62, 100)]);

        test_bridge(source, &bank, stop)?.run();

        assert_eq!(bank.writes(), vec![(26, LineState::On)]);
        Ok(())
    }

    #[test]
    fn a_hard_wait_error_stops_the_bridge() -> Result<(), Box<dyn Error>> {
        let stop = Arc::new(AtomicBool::new(false));
        let bank = MockBank::new("mock-bank", &[25, 26, 27]);
        let source = MockSource::new(Arc::clone(&stop));
        source.wake(&[note_on(60, 100)]);
        source.fail_wait();
        // Only reached if the loop wrongly survives the failed wait.
        source.wake(&[note_on(60, 0)]);

        test_bridge(source, &bank, stop)?.run();

        assert_eq!(bank.writes(), vec![(25, LineState::On)]);
        Ok(())
    }

    #[test]
    fn a_read_error_ends_the_drain_but_not_the_bridge() -> Result<(), Box<dyn Error>> {
        let stop = Arc::new(AtomicBool::new(false));
        let bank = MockBank::new("mock-bank", &[25, 26, 27]);
        let source = MockSource::new(Arc::clone(&stop));
        source.wake_with(
            vec![
                Ok(Some(note_on(60, 100))),
                Err(SeqError::Read(alsa::Error::new(
                    "snd_seq_event_input",
                    libc::ENOSPC,
                ))),
                Ok(Some(note_on(62, 100))),
                Ok(None),
            ],
            false,
        );
        source.wake_and_stop(&[]);

        test_bridge(source, &bank, stop)?.run();

        // The event queued behind the error comes through on the next drain.
        assert_eq!(
            bank.writes(),
            vec![(25, LineState::On), (26, LineState::On)]
        );
        Ok(())
    }

    #[test]
    fn discovery_events_reattach_through_the_loop() -> Result<(), Box<dyn Error>> {
        let stop = Arc::new(AtomicBool::new(false));
        let bank = MockBank::new("mock-bank", &[25, 26, 27]);
        let source = MockSource::new(Arc::clone(&stop));
        source.wake_and_stop(&[SeqEvent::ClientStart { client: 42 }]);

        test_bridge(source.clone(), &bank, stop)?.run();

        assert_eq!(source.specs(), vec!["rtpmidi:0"]);
        assert!(bank.writes().is_empty());
        Ok(())
    }
}
