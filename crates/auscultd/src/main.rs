//! auscultd binary: wiring, startup sequence and signal handling
//!
//! Brings the daemon up in dependency order: catalog, pneumatics
//! service, signal thread, serial port (with the tank filling during the
//! wait), trigger device init, timer service, sync worker, then hands
//! the thread to the engine poll loop. Fatal control-plane errors drive
//! the actuators off synchronously before the process exits.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signal_hook::consts::{SIGHUP, SIGTERM};
use signal_hook::iterator::Signals;

use auscult_core::config::{load_config, save_config};
use auscult_core::gain::GAIN_MAX;
use auscult_core::pulse::PULSE_TRACK;
use auscult_core::{DaemonConfig, PhysioStore, SoundCatalog};
use auscult_io::serial::open_port_with_retry;
use auscult_io::{
    AinReader, GpioOutput, NullGpio, PneumoLine, SerialTrigger, SilentTrigger, SysfsAin,
    SysfsGpio, TriggerBackend, UdpSyncSource,
};

use auscultd::engine::Engine;
use auscultd::exit;
use auscultd::monitor::run_monitor;
use auscultd::pneumatics::{PneumaticsService, PneumoHandle};
use auscultd::syncworker::{spawn_sync_worker, SyncCounters};
use auscultd::timers::TimerService;

#[derive(Parser, Debug)]
#[command(name = "auscultd", about = "Patient-simulator sound and pneumatic sync daemon")]
struct Cli {
    /// Serial device node of the audio trigger board (e.g. /dev/ttyO1);
    /// required unless running in monitor or test mode
    device: Option<PathBuf>,

    /// Verbose logging, stay in the foreground
    #[arg(short, long)]
    debug: bool,

    /// Read-only status display, no device control
    #[arg(short, long)]
    monitor: bool,

    /// Status display plus extended device diagnostics
    #[arg(short, long)]
    test: bool,

    /// Configuration file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    write_config: bool,
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.debug { "debug" } else { "info" }),
    )
    .format_timestamp_millis()
    .init();

    let config_path = cli.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let config: DaemonConfig = load_config(&config_path);

    if cli.write_config {
        if let Err(e) = save_config(&config, &config_path) {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
        log::info!("wrote configuration to {:?}", config_path);
        std::process::exit(0);
    }

    if cli.device.is_none() && !cli.monitor && !cli.test {
        eprintln!("usage: auscultd [-d] [-m] [-t] <serial device>");
        std::process::exit(2);
    }
    let store = Arc::new(PhysioStore::new());

    if cli.monitor || cli.test {
        let trigger: Option<Box<dyn TriggerBackend>> = if cli.test {
            Some(open_trigger(&cli.device, &config, || {}))
        } else {
            None
        };
        run_monitor(&store, trigger);
    }

    run_daemon(cli, config, store);
}

/// Open the serial port and wrap it in the protocol backend, falling
/// back to the silent backend when the port never appears.
fn open_trigger(
    device: &Option<PathBuf>,
    config: &DaemonConfig,
    keep_alive: impl FnMut(),
) -> Box<dyn TriggerBackend> {
    let Some(device) = device else {
        return Box::new(SilentTrigger);
    };
    match open_port_with_retry(
        device,
        config.serial.baud,
        config.serial.open_tries,
        Duration::from_millis(config.serial.retry_delay_ms),
        keep_alive,
    ) {
        Some(port) => Box::new(SerialTrigger::new(port)),
        None => {
            log::warn!("no serial port, running silent");
            Box::new(SilentTrigger)
        }
    }
}

/// Log, drive all actuators off and terminate.
fn fatal(pneumo: &PneumoHandle, code: i32, msg: &str) -> ! {
    log::error!("{}", msg);
    if pneumo.all_off_blocking().is_err() {
        log::error!("pneumatics unavailable during shutdown");
    }
    std::process::exit(code);
}

fn run_daemon(cli: Cli, config: DaemonConfig, store: Arc<PhysioStore>) -> ! {
    // Sound catalog: load failure means the engine could never select a
    // track, so there is nothing useful to run.
    let catalog = match SoundCatalog::load(&config.catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(exit::CATALOG);
        }
    };
    if cli.debug {
        for entry in catalog.entries() {
            println!(
                "{},{},{},{},{}",
                entry.category, entry.track, entry.name, entry.low_limit, entry.high_limit
            );
        }
    }

    // Pneumatics first: every later failure path wants all_off.
    let pins = [
        (PneumoLine::TankFill, config.gpio.tank_fill),
        (PneumoLine::RiseLeft, config.gpio.rise_left),
        (PneumoLine::RiseRight, config.gpio.rise_right),
        (PneumoLine::Fall, config.gpio.fall),
    ]
    .into_iter()
    .collect();
    let gpio: Box<dyn GpioOutput> = match SysfsGpio::new(pins) {
        Ok(gpio) => Box::new(gpio),
        Err(e) => {
            log::warn!("GPIO unavailable ({}), pneumatics disabled", e);
            Box::new(NullGpio)
        }
    };
    let pneumo = match PneumaticsService::spawn(gpio) {
        Ok(handle) => handle,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = pneumo.all_off() {
        fatal(&pneumo, 1, &format!("pneumatics service died at startup: {}", e));
    }

    // Signal thread: HUP parks the hardware and keeps running, TERM
    // parks it and exits cleanly. SIGPIPE stays at the Rust default
    // (ignored).
    let mut signals = match Signals::new([SIGHUP, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => fatal(&pneumo, 1, &format!("failed to install signal handlers: {}", e)),
    };
    let signal_pneumo = pneumo.clone();
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGHUP => {
                        let _ = signal_pneumo.all_off_blocking();
                        log::info!("hangup signal caught, actuators off");
                    }
                    SIGTERM => {
                        let _ = signal_pneumo.all_off_blocking();
                        log::info!("terminate signal caught");
                        std::process::exit(0);
                    }
                    _ => {}
                }
            }
        })
        .unwrap_or_else(|e| fatal(&pneumo, 1, &format!("failed to spawn signal thread: {}", e)));

    // Serial port: the device's USB port can trail boot by seconds, so
    // the retry loop keeps the air reservoir filling while it waits.
    let mut boot_ain = SysfsAin::new();
    let mut filling = false;
    let boot_pneumo = pneumo.clone();
    let mut trigger = open_trigger(&cli.device, &config, || {
        let reading = boot_ain.read(config.tank.ain_channel);
        if reading < config.tank.threshold_low && !filling {
            let _ = boot_pneumo.set(PneumoLine::TankFill, true);
            filling = true;
        } else if reading > config.tank.threshold_high && filling {
            let _ = boot_pneumo.set(PneumoLine::TankFill, false);
            filling = false;
        }
    });
    // Pump off before device init; the engine takes over maintenance.
    if let Err(e) = pneumo.all_off() {
        fatal(&pneumo, 1, &format!("pneumatics service died: {}", e));
    }

    init_trigger(trigger.as_mut(), &config);

    // Timer service: without working one-shot timers the machines
    // cannot sequence safely.
    let (event_tx, event_rx) = crossbeam::channel::unbounded();
    let timers = match TimerService::spawn(event_tx) {
        Ok(timers) => timers,
        Err(e) => fatal(&pneumo, 1, &format!("{}", e)),
    };

    // Sync source and counter worker.
    let source = match UdpSyncSource::bind(&config.sync_bind_addr) {
        Ok(source) => source,
        Err(e) => fatal(&pneumo, exit::SYNC_BIND, &format!("{}", e)),
    };
    let counters = Arc::new(SyncCounters::new());
    if let Err(e) = spawn_sync_worker(Box::new(source), Arc::clone(&counters), pneumo.clone()) {
        fatal(&pneumo, 1, &format!("failed to spawn sync worker: {}", e));
    }

    log::info!("running");

    let mut engine = Engine::new(
        config,
        store,
        catalog,
        trigger,
        pneumo.clone(),
        timers,
        event_rx,
        counters,
        Box::new(SysfsAin::new()),
    );

    let running = AtomicBool::new(true);
    match engine.run(&running) {
        Ok(()) => std::process::exit(0),
        Err(e) => fatal(&pneumo, 1, &format!("fatal engine error: {}", e)),
    }
}

/// Device bring-up: identify the board, quiet everything, zero the
/// channel gains, preset the pulse track, then play the startup chime
/// and wait (bounded) for the board to report idle.
fn init_trigger(trigger: &mut dyn TriggerBackend, config: &DaemonConfig) {
    match trigger.version() {
        Ok(version) => log::info!("trigger version: {}", version),
        Err(e) => log::warn!("trigger version unavailable: {}", e),
    }
    match trigger.sys_info() {
        Ok(info) => {
            log::info!("trigger: {} voices, {} tracks", info.voices, info.tracks);
            if !info.mono {
                log::warn!("trigger is running stereo mode, must be mono");
            }
        }
        Err(e) => log::warn!("trigger sys info unavailable: {}", e),
    }

    let mut check = |result: Result<(), auscult_io::TriggerError>| {
        if let Err(e) = result {
            log::warn!("trigger init step failed: {}", e);
        }
    };
    check(trigger.amp_power(false));
    check(trigger.stop_all_tracks());
    for channel in 0..8 {
        check(trigger.channel_gain(channel, 0));
    }
    check(trigger.track_gain(PULSE_TRACK, GAIN_MAX));

    check(trigger.track_play_poly(0, config.startup_chime_track));
    for _ in 0..500 {
        match trigger.tracks_playing() {
            Ok(0) => break,
            Ok(_) => std::thread::sleep(Duration::from_millis(10)),
            Err(e) => {
                log::warn!("tracks-playing probe failed: {}", e);
                break;
            }
        }
    }
}
