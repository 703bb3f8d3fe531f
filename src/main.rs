use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use keytypist::channel::{encode_frame, ControlLink, LogLink, StreamLink};
use keytypist::clock::{ManualClock, SystemClock};
use keytypist::device::{Device, DeviceParts};
use keytypist::gpio::{BusyIndicator, LogIndicator, NullPin, SysfsIndicator, SysfsInput};
use keytypist::model::{AbortSignal, ConfigUpdate, Settings};
use keytypist::playback::{open_emitter, PlaybackBackend, DEFAULT_HIDG_DEVICE};
use keytypist::sim::{self, SimKeyboard};
use keytypist::store::{JsonFileStore, MemoryStore};
use keytypist::trigger::InputPin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlaybackBackendArg {
    Auto,
    Hidg,
    X11,
    Console,
}

impl PlaybackBackendArg {
    fn to_library(self) -> PlaybackBackend {
        match self {
            PlaybackBackendArg::Auto => PlaybackBackend::Auto,
            PlaybackBackendArg::Hidg => PlaybackBackend::Hidg,
            PlaybackBackendArg::X11 => PlaybackBackend::X11,
            PlaybackBackendArg::Console => PlaybackBackend::Console,
        }
    }
}

#[derive(Debug, Args, Clone)]
struct StoreArgs {
    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
struct KeyboardArgs {
    /// Keyboard backend.
    ///
    /// - auto: USB HID gadget if present, otherwise X11 if DISPLAY is set
    /// - hidg: write boot keyboard reports to the gadget device
    /// - x11: inject key events through XTEST
    /// - console: echo keystrokes to stderr
    #[arg(long, value_enum, default_value_t = PlaybackBackendArg::Auto)]
    backend: PlaybackBackendArg,

    /// HID gadget device node
    #[arg(long, value_name = "PATH", default_value = DEFAULT_HIDG_DEVICE)]
    hidg_device: PathBuf,
}

#[derive(Debug, Args, Clone)]
struct GpioArgs {
    /// sysfs GPIO number of the start/abort button
    #[arg(long, value_name = "PIN")]
    button_gpio: Option<u32>,

    /// Treat a high level on the button pin as pressed (default: pulled up, active low)
    #[arg(long, requires = "button_gpio")]
    button_active_high: bool,

    /// sysfs GPIO number of the busy LED (active low)
    #[arg(long, value_name = "PIN")]
    busy_gpio: Option<u32>,
}

/// Per-run overrides. Not persisted.
#[derive(Debug, Args, Clone)]
struct OverrideArgs {
    /// Text file to type instead of the stored payload, or '-' for stdin
    #[arg(long, value_name = "PATH")]
    text: Option<PathBuf>,

    #[arg(long)]
    base_delay: Option<i32>,

    #[arg(long)]
    delay_variance: Option<i32>,

    /// One typo in N characters (0 disables)
    #[arg(long)]
    error_rate: Option<i32>,

    /// One thinking pause in N word boundaries (0 disables)
    #[arg(long)]
    long_pause_chance: Option<i32>,

    /// Countdown seconds before typing starts
    #[arg(long)]
    start_delay: Option<i32>,
}

impl OverrideArgs {
    fn apply(&self, settings: &mut Settings) -> Result<()> {
        settings.config.apply(&ConfigUpdate {
            base_delay: self.base_delay,
            delay_variance: self.delay_variance,
            error_rate: self.error_rate,
            long_pause_chance: self.long_pause_chance,
            start_delay: self.start_delay,
        });
        if let Some(path) = &self.text {
            settings.payload = read_input(path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Parser)]
#[command(name = "keytypist")]
#[command(about = "Human-like keystroke emitter for USB HID gadgets and X11", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the device loop: control channel, button and typist
    Serve {
        /// Control link: 'stdio' or a serial device path
        #[arg(long, value_name = "stdio|PATH", default_value = "stdio")]
        link: String,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        keyboard: KeyboardArgs,

        #[command(flatten)]
        gpio: GpioArgs,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Type the payload once, then exit
    Once {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        keyboard: KeyboardArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run a session against a virtual clock and print what would be typed
    Simulate {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the stored settings as a settings frame
    Show {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn store_path(args: &StoreArgs) -> Result<PathBuf> {
    if let Some(path) = &args.store {
        return Ok(path.clone());
    }
    dirs::config_dir()
        .map(|dir| dir.join("keytypist").join("settings.json"))
        .ok_or_else(|| anyhow!("no user config directory; pass --store"))
}

fn open_store(args: &StoreArgs) -> Result<JsonFileStore> {
    let path = store_path(args)?;
    log::debug!("settings file: {}", path.display());
    JsonFileStore::open(&path).with_context(|| format!("failed to open {}", path.display()))
}

/// A volatile store holding `settings`, for runs that must not touch the file.
fn scratch_store(settings: &Settings) -> Result<MemoryStore> {
    let mut store = MemoryStore::new();
    settings.save_config(&mut store)?;
    settings.save_payload(&mut store)?;
    Ok(store)
}

fn open_link(target: &str) -> Result<Box<dyn ControlLink>> {
    if target == "stdio" {
        return Ok(Box::new(StreamLink::stdio()?));
    }
    Ok(Box::new(StreamLink::open_device(Path::new(target))?))
}

fn open_button(args: &GpioArgs) -> Result<Box<dyn InputPin>> {
    match args.button_gpio {
        Some(pin) => Ok(Box::new(SysfsInput::open(pin, !args.button_active_high)?)),
        None => Ok(Box::new(NullPin)),
    }
}

fn open_indicator(args: &GpioArgs) -> Result<Box<dyn BusyIndicator>> {
    match args.busy_gpio {
        Some(pin) => Ok(Box::new(SysfsIndicator::open(pin)?)),
        None => Ok(Box::new(LogIndicator)),
    }
}

fn install_ctrlc(abort: AbortSignal, shutdown: Option<AbortSignal>) -> Result<()> {
    ctrlc::set_handler(move || {
        abort.raise();
        if let Some(shutdown) = &shutdown {
            shutdown.raise();
        }
    })
    .context("failed to install Ctrl+C handler")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            link,
            store,
            keyboard,
            gpio,
            seed,
        } => {
            let parts = DeviceParts {
                store: Box::new(open_store(&store)?),
                link: open_link(&link)?,
                button: open_button(&gpio)?,
                keyboard: open_emitter(keyboard.backend.to_library(), &keyboard.hidg_device)?,
                indicator: open_indicator(&gpio)?,
            };
            let mut device = Device::new(parts, SystemClock::new(), rng_from_seed(seed));
            install_ctrlc(
                device.controller().abort_signal(),
                Some(device.shutdown_signal()),
            )?;
            device.run();
        }
        Command::Once {
            store,
            keyboard,
            overrides,
            seed,
        } => {
            let mut settings = Settings::load(&open_store(&store)?);
            overrides.apply(&mut settings)?;

            let parts = DeviceParts {
                store: Box::new(scratch_store(&settings)?),
                link: Box::new(LogLink),
                button: Box::new(NullPin),
                keyboard: open_emitter(keyboard.backend.to_library(), &keyboard.hidg_device)?,
                indicator: Box::new(LogIndicator),
            };
            let mut device = Device::new(parts, SystemClock::new(), rng_from_seed(seed));
            install_ctrlc(device.controller().abort_signal(), None)?;

            let outcome = device.run_once();
            eprintln!("{outcome:?}");
        }
        Command::Simulate {
            store,
            overrides,
            seed,
        } => {
            let mut settings = Settings::load(&open_store(&store)?);
            overrides.apply(&mut settings)?;

            let clock = ManualClock::new();
            let recorder = SimKeyboard::new(clock.clone());
            let parts = DeviceParts {
                store: Box::new(scratch_store(&settings)?),
                link: Box::new(LogLink),
                button: Box::new(NullPin),
                keyboard: Box::new(recorder.clone()),
                indicator: Box::new(LogIndicator),
            };
            let mut device = Device::new(parts, clock, rng_from_seed(seed));
            let outcome = device.run_once();

            let strokes = recorder.strokes();
            let stats = sim::stats(&strokes);
            println!("{}", sim::simulate_typed_text(&strokes));
            eprintln!(
                "{outcome:?}: {} keystrokes, {} typos corrected, {:.1}s of typing",
                stats.keystrokes,
                stats.typos,
                stats.span_ms as f64 / 1000.0
            );
        }
        Command::Show { store } => {
            let settings = Settings::load(&open_store(&store)?);
            let frame = encode_frame(&settings.snapshot())
                .ok_or_else(|| anyhow!("failed to encode settings"))?;
            println!("{frame}");
        }
    }

    Ok(())
}
