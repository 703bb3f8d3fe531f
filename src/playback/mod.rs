pub mod backends;

use std::path::Path;

use anyhow::{anyhow, Result};

use crate::keyboard::KeyEmitter;

pub const DEFAULT_HIDG_DEVICE: &str = "/dev/hidg0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackBackend {
    Auto,
    Hidg,
    X11,
    Console,
}

fn env_is_set(name: &str) -> bool {
    std::env::var_os(name)
        .map(|v| !v.is_empty())
        .unwrap_or(false)
}

fn auto_backend(hidg_device: &Path) -> PlaybackBackend {
    // A configured USB gadget is the real keyboard; prefer it over a desktop session.
    if hidg_device.exists() {
        return PlaybackBackend::Hidg;
    }

    if env_is_set("DISPLAY") {
        return PlaybackBackend::X11;
    }

    PlaybackBackend::Auto
}

fn backend_unavailable_message(hidg_device: &Path) -> String {
    let mut parts = Vec::new();

    if env_is_set("DISPLAY") {
        parts.push("DISPLAY is set".to_string());
    }
    if env_is_set("WAYLAND_DISPLAY") {
        parts.push("WAYLAND_DISPLAY is set (Wayland is not supported)".to_string());
    }
    parts.push(format!("{} does not exist", hidg_device.display()));

    format!("Detected environment: {}", parts.join(", "))
}

fn require_supported_backend(
    selected: PlaybackBackend,
    resolved: PlaybackBackend,
    hidg_device: &Path,
) -> Result<()> {
    match resolved {
        PlaybackBackend::Hidg | PlaybackBackend::Console => Ok(()),
        PlaybackBackend::X11 => {
            if cfg!(feature = "x11") {
                Ok(())
            } else {
                let how = match selected {
                    PlaybackBackend::Auto => "detected",
                    _ => "requested",
                };
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.)"
                ))
            }
        }
        PlaybackBackend::Auto => Err(anyhow!(
            "No supported keyboard backend detected. {details}\n\
             Configure a USB HID gadget, run inside an X11 session, or pass --backend console.",
            details = backend_unavailable_message(hidg_device),
        )),
    }
}

pub fn resolve_backend(requested: PlaybackBackend, hidg_device: &Path) -> Result<PlaybackBackend> {
    let resolved = match requested {
        PlaybackBackend::Auto => auto_backend(hidg_device),
        other => other,
    };

    require_supported_backend(requested, resolved, hidg_device)?;
    Ok(resolved)
}

pub fn open_emitter(requested: PlaybackBackend, hidg_device: &Path) -> Result<Box<dyn KeyEmitter>> {
    let backend = resolve_backend(requested, hidg_device)?;
    log::info!("keyboard backend: {backend:?}");

    match backend {
        PlaybackBackend::Hidg => Ok(Box::new(backends::hidg::HidgKeyboard::open(hidg_device)?)),
        PlaybackBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Box::new(backends::x11::X11Keyboard::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        PlaybackBackend::Console => Ok(Box::new(backends::console::ConsoleKeyboard::new())),
        PlaybackBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}
