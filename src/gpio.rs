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
use std::fmt;

use thiserror::Error;

mod cdev;
mod mock;

/// The logical state of an output line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineState {
    On,
    Off,
}

impl LineState {
    /// Returns the raw value written to the hardware.
    pub fn value(&self) -> u8 {
        match self {
            LineState::On => 1,
            LineState::Off => 0,
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineState::On => write!(f, "on"),
            LineState::Off => write!(f, "off"),
        }
    }
}

/// Typed error for GPIO chip and line failures.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The chip could not be opened.
    #[error("Unable to open GPIO chip '{chip}': {err}")]
    Chip { chip: String, err: gpio_cdev::Error },

    /// A line could not be requested as an output.
    #[error("Unable to request line {line} on '{chip}': {err}")]
    Line {
        chip: String,
        line: u32,
        err: gpio_cdev::Error,
    },

    /// A line value could not be written.
    #[error("Unable to write to line {line}: {err}")]
    Write { line: u32, err: String },

    /// The line was not requested by this bank.
    #[error("Line {0} is not part of this bank")]
    UnknownLine(u32),
}

/// A bank of exclusively owned digital output lines. Lines are requested once
/// at startup and released when the bank drops.
pub trait Bank: fmt::Display {
    /// Sets the logical state of the given line.
    fn set(&self, line: u32, state: LineState) -> Result<(), GpioError>;

    /// Returns the line offsets owned by this bank.
    fn lines(&self) -> Vec<u32>;
}

/// Opens a bank on the given chip with every line requested as an output,
/// initially off. Chip names beginning with "mock" get a mock bank.
pub fn open(chip: &str, lines: &[u32]) -> Result<Box<dyn Bank>, GpioError> {
    if chip.starts_with("mock") {
        return Ok(Box::new(mock::Bank::new(chip, lines)));
    }

    Ok(Box::new(cdev::Bank::new(chip, lines)?))
}
