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
use std::{fmt, path::PathBuf};

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::debug;

use super::{GpioError, LineState};

/// The consumer label attached to requested lines.
const CONSUMER: &str = "mgpio";

/// A bank of output lines on a GPIO character device. Dropping the bank
/// releases every line and closes the chip.
pub struct Bank {
    chip: String,
    handles: Vec<(u32, LineHandle)>,
}

impl Bank {
    /// Opens the chip and requests every line as an output, initially off.
    /// On failure any lines already requested are released before returning.
    pub fn new(chip: &str, lines: &[u32]) -> Result<Bank, GpioError> {
        let mut device = Chip::new(chip_path(chip)).map_err(|err| GpioError::Chip {
            chip: chip.to_string(),
            err,
        })?;

        let mut handles = Vec::with_capacity(lines.len());
        for &offset in lines {
            let handle = device
                .get_line(offset)
                .and_then(|line| {
                    line.request(LineRequestFlags::OUTPUT, LineState::Off.value(), CONSUMER)
                })
                .map_err(|err| GpioError::Line {
                    chip: chip.to_string(),
                    line: offset,
                    err,
                })?;
            handles.push((offset, handle));
        }

        debug!(
            chip,
            lines = format!("{:?}", lines),
            "Requested GPIO output lines."
        );

        Ok(Bank {
            chip: chip.to_string(),
            handles,
        })
    }
}

impl super::Bank for Bank {
    fn set(&self, line: u32, state: LineState) -> Result<(), GpioError> {
        let handle = self
            .handles
            .iter()
            .find(|(offset, _)| *offset == line)
            .map(|(_, handle)| handle)
            .ok_or(GpioError::UnknownLine(line))?;

        handle
            .set_value(state.value())
            .map_err(|err| GpioError::Write {
                line,
                err: err.to_string(),
            })
    }

    fn lines(&self) -> Vec<u32> {
        self.handles.iter().map(|(offset, _)| *offset).collect()
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cdev)", self.chip)
    }
}

/// Returns the device path for a chip name. Absolute paths pass through.
fn chip_path(chip: &str) -> PathBuf {
    if chip.starts_with('/') {
        PathBuf::from(chip)
    } else {
        PathBuf::from("/dev").join(chip)
    }
}
