use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use keytypist::playback::{resolve_backend, PlaybackBackend};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvRestore {
    display: Option<OsString>,
    wayland_display: Option<OsString>,
}

impl EnvRestore {
    fn snapshot() -> Self {
        Self {
            display: std::env::var_os("DISPLAY"),
            wayland_display: std::env::var_os("WAYLAND_DISPLAY"),
        }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        // SAFETY: all env mutations in this file happen under `env_lock()`.
        match &self.display {
            Some(v) => unsafe { std::env::set_var("DISPLAY", v) },
            None => unsafe { std::env::remove_var("DISPLAY") },
        }
        match &self.wayland_display {
            Some(v) => unsafe { std::env::set_var("WAYLAND_DISPLAY", v) },
            None => unsafe { std::env::remove_var("WAYLAND_DISPLAY") },
        }
    }
}

fn unset(name: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::remove_var(name) };
}

fn set(name: &str, value: &str) {
    // SAFETY: callers hold the global test mutex from `env_lock()`.
    unsafe { std::env::set_var(name, value) };
}

fn absent_gadget() -> PathBuf {
    Path::new("/nonexistent/keytypist/hidg0").to_path_buf()
}

#[test]
fn auto_prefers_gadget_over_display() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();
    set("DISPLAY", ":0");

    let gadget = tempfile::NamedTempFile::new().unwrap();
    let resolved = resolve_backend(PlaybackBackend::Auto, gadget.path()).expect("should resolve");
    assert_eq!(resolved, PlaybackBackend::Hidg);
}

#[test]
fn auto_errors_or_resolves_on_x11_only() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();
    set("DISPLAY", ":0");

    #[cfg(feature = "x11")]
    {
        let resolved =
            resolve_backend(PlaybackBackend::Auto, &absent_gadget()).expect("should resolve");
        assert_eq!(resolved, PlaybackBackend::X11);
    }

    #[cfg(not(feature = "x11"))]
    {
        let err = resolve_backend(PlaybackBackend::Auto, &absent_gadget()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("X11"), "got: {msg}");
        assert!(msg.contains("disabled"), "got: {msg}");
    }
}

#[test]
fn auto_without_any_backend_explains_environment() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();
    unset("DISPLAY");
    set("WAYLAND_DISPLAY", "wayland-1");

    let err = resolve_backend(PlaybackBackend::Auto, &absent_gadget()).unwrap_err();
    let msg = format!("{err:#}");
    assert!(
        msg.contains("No supported keyboard backend detected"),
        "expected missing-backend wording, got: {msg}"
    );
    assert!(
        msg.contains("WAYLAND_DISPLAY is set"),
        "expected mention of WAYLAND_DISPLAY, got: {msg}"
    );
    assert!(msg.contains("hidg0 does not exist"), "got: {msg}");
}

#[test]
fn explicit_backends_skip_detection() {
    let _guard = env_lock().lock().unwrap();
    let _restore = EnvRestore::snapshot();
    unset("DISPLAY");

    let resolved =
        resolve_backend(PlaybackBackend::Console, &absent_gadget()).expect("should resolve");
    assert_eq!(resolved, PlaybackBackend::Console);

    let resolved =
        resolve_backend(PlaybackBackend::Hidg, &absent_gadget()).expect("should resolve");
    assert_eq!(resolved, PlaybackBackend::Hidg);

    #[cfg(feature = "x11")]
    {
        let resolved =
            resolve_backend(PlaybackBackend::X11, &absent_gadget()).expect("should resolve");
        assert_eq!(resolved, PlaybackBackend::X11);
    }
}
