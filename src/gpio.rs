//! Button input and busy LED through the Linux sysfs GPIO interface.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::trigger::InputPin;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

fn export_pin(root: &Path, pin: u32, direction: &str) -> Result<PathBuf> {
    let dir = root.join(format!("gpio{pin}"));
    if !dir.exists() {
        fs::write(root.join("export"), pin.to_string())
            .with_context(|| format!("failed to export GPIO {pin}"))?;
    }
    fs::write(dir.join("direction"), direction)
        .with_context(|| format!("failed to set GPIO {pin} direction to {direction}"))?;
    Ok(dir)
}

pub struct SysfsInput {
    pin: u32,
    value: File,
    active_low: bool,
    failed: bool,
}

impl SysfsInput {
    pub fn open(pin: u32, active_low: bool) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin, active_low)
    }

    pub fn open_at(root: &Path, pin: u32, active_low: bool) -> Result<Self> {
        let dir = export_pin(root, pin, "in")?;
        let value = File::open(dir.join("value"))
            .with_context(|| format!("failed to open GPIO {pin} value"))?;
        Ok(Self {
            pin,
            value,
            active_low,
            failed: false,
        })
    }

    fn read_high(&mut self) -> std::io::Result<bool> {
        let mut buf = [0u8; 1];
        self.value.seek(SeekFrom::Start(0))?;
        self.value.read_exact(&mut buf)?;
        Ok(buf[0] == b'1')
    }
}

impl InputPin for SysfsInput {
    fn is_active(&mut self) -> bool {
        match self.read_high() {
            Ok(high) => high != self.active_low,
            Err(err) => {
                if !self.failed {
                    log::warn!("failed to read GPIO {}: {err}", self.pin);
                    self.failed = true;
                }
                false
            }
        }
    }
}

/// A button that is never pressed, for hosts without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPin;

impl InputPin for NullPin {
    fn is_active(&mut self) -> bool {
        false
    }
}

pub trait BusyIndicator {
    fn set_busy(&mut self, busy: bool);
}

/// Busy LED wired active-low: the line is driven low while typing.
pub struct SysfsIndicator {
    pin: u32,
    value: File,
}

impl SysfsIndicator {
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin)
    }

    pub fn open_at(root: &Path, pin: u32) -> Result<Self> {
        let dir = export_pin(root, pin, "out")?;
        let value = OpenOptions::new()
            .write(true)
            .open(dir.join("value"))
            .with_context(|| format!("failed to open GPIO {pin} value"))?;
        let mut indicator = Self { pin, value };
        indicator.set_busy(false);
        Ok(indicator)
    }
}

impl BusyIndicator for SysfsIndicator {
    fn set_busy(&mut self, busy: bool) {
        let level: &[u8] = if busy { b"0" } else { b"1" };
        let res = self
            .value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.write_all(level));
        if let Err(err) = res {
            log::warn!("failed to drive busy GPIO {}: {err}", self.pin);
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogIndicator;

impl BusyIndicator for LogIndicator {
    fn set_busy(&mut self, busy: bool) {
        log::debug!("busy indicator {}", if busy { "on" } else { "off" });
    }
}
