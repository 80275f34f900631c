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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use super::{GpioError, LineState};

/// A mock bank. Doesn't actually touch any hardware.
#[derive(Clone)]
pub struct Bank {
    name: String,
    lines: Vec<u32>,
    writes: Arc<Mutex<Vec<(u32, LineState)>>>,
    failing: Arc<AtomicBool>,
}

impl Bank {
    /// Creates the given mock bank.
    pub fn new(name: &str, lines: &[u32]) -> Bank {
        Bank {
            name: name.to_string(),
            lines: lines.to_vec(),
            writes: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    #[cfg(test)]
    /// Returns every write issued to this bank, in order.
    pub fn writes(&self) -> Vec<(u32, LineState)> {
        self.writes
            .lock()
            .expect("unable to get writes lock")
            .clone()
    }

    #[cfg(test)]
    /// Makes every subsequent write fail.
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::Relaxed);
    }
}

impl super::Bank for Bank {
    fn set(&self, line: u32, state: LineState) -> Result<(), GpioError> {
        if !self.lines.contains(&line) {
            return Err(GpioError::UnknownLine(line));
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(GpioError::Write {
                line,
                err: "mock write failure".to_string(),
            });
        }

        self.writes
            .lock()
            .expect("unable to get writes lock")
            .push((line, state));
        Ok(())
    }

    fn lines(&self) -> Vec<u32> {
        self.lines.clone()
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use crate::gpio::{Bank as _, GpioError, LineState};

    #[test]
    fn writes_are_recorded_in_order() -> Result<(), Box<dyn Error>> {
        let bank = super::Bank::new("mock-bank", &[25, 26]);

        bank.set(25, LineState::On)?;
        bank.set(26, LineState::On)?;
        bank.set(25, LineState::Off)?;

        assert_eq!(
            bank.writes(),
            vec![
                (25, LineState::On),
                (26, LineState::On),
                (25, LineState::Off),
            ]
        );
        Ok(())
    }

    #[test]
    fn unknown_lines_are_rejected() {
        let bank = super::Bank::new("mock-bank", &[25]);

        assert!(matches!(
            bank.set(99, LineState::On),
            Err(GpioError::UnknownLine(99))
        ));
        assert!(bank.writes().is_empty());
    }

    #[test]
    fn failing_banks_reject_writes() {
        let bank = super::Bank::new("mock-bank", &[25]);
        bank.fail_writes();

        assert!(matches!(
            bank.set(25, LineState::On),
            Err(GpioError::Write { line: 25, .. })
        ));
        assert!(bank.writes().is_empty());
    }
}
