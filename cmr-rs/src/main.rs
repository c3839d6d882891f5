use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cmr::backend::{MemoryBackend, SerialBackend, SharedBackend, UdpBackend};
use cmr::cli::{self, BackendChoice, Command, Target};
use cmr::config::Settings;
use cmr::error::RunError;
use cmr::script::{export_python, spec, Engine, EngineObserver, Script, Services, Strictness};

/// Engine callbacks forwarded to the async side.
enum Event {
    Status(String),
    Error(String),
    Finished,
}

struct ChannelObserver(mpsc::UnboundedSender<Event>);

impl EngineObserver for ChannelObserver {
    fn on_status(&self, message: &str) {
        let _ = self.0.send(Event::Status(message.to_owned()));
    }

    fn on_error(&self, error: &RunError) {
        let _ = self.0.send(Event::Error(error.to_string()));
    }

    fn on_finished(&self) {
        let _ = self.0.send(Event::Finished);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "cmr=info".into()))
        .with(fmt::layer())
        .init();

    let args = cli::parse_args();

    let settings = match Settings::load(args.settings.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cmr: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        Command::Run {
            script,
            target,
            port,
        } => run(&settings, &script, &target, port).await,
        Command::Check { script, tolerant } => check(&script, tolerant),
        Command::Export {
            script,
            output,
            port,
        } => export(&settings, &script, output, port.as_deref()),
        Command::Commands => {
            list_commands();
            Ok(())
        }
        Command::Channel { serial, channel } => set_channel(&settings, serial, channel),
        Command::Ports => list_ports(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("cmr: {msg}");
            ExitCode::FAILURE
        }
    }
}

// ── run ───────────────────────────────────────────────────────────────────────

fn connect(settings: &Settings, target: &Target, port: Option<u16>) -> Result<SharedBackend, String> {
    match target.choice() {
        BackendChoice::Serial(given) => {
            let path = given
                .or(settings.serial.port.as_deref())
                .ok_or("no serial port given and none in settings")?;
            let backend = SerialBackend::open(path, settings.serial.baud, settings.serial.options())
                .map_err(|e| format!("{path}: {e}"))?;
            Ok(Arc::new(backend))
        }
        BackendChoice::Udp(given) => {
            let host = given
                .or(settings.udp.host.as_deref())
                .ok_or("no UDP host given and none in settings")?;
            let port = port.unwrap_or(settings.udp.port);
            let backend = UdpBackend::connect(host, port).map_err(|e| format!("{host}:{port}: {e}"))?;
            Ok(Arc::new(backend))
        }
        BackendChoice::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

async fn run(
    settings: &Settings,
    path: &Path,
    target: &Target,
    port: Option<u16>,
) -> Result<(), String> {
    let script = Script::from_file(path, Strictness::Strict)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let backend = connect(settings, target, port)?;

    let services = Services {
        runner: Arc::new(settings.python.runner()),
        ..Services::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = Engine::new(services)
        .with_observer(Arc::new(ChannelObserver(tx)))
        .with_stop_timeout(settings.engine.stop_join());
    engine
        .set_backend(Some(Arc::clone(&backend)))
        .map_err(|e| e.to_string())?;
    engine.load(script).map_err(|e| e.to_string())?;
    engine.run().map_err(|e| e.to_string())?;

    let mut failure = None;
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Event::Status(message)) => println!("{message}"),
                Some(Event::Error(message)) => failure = Some(message),
                Some(Event::Finished) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                tokio::task::block_in_place(|| engine.stop());
                break;
            }
        }
    }

    tokio::task::block_in_place(|| engine.wait());
    if let Err(e) = backend.disconnect() {
        error!("disconnect failed: {e}");
    }
    match failure {
        Some(message) => Err(message),
        None => Ok(()),
    }
}

// ── check / export / commands ─────────────────────────────────────────────────

fn check(path: &Path, tolerant: bool) -> Result<(), String> {
    let strictness = if tolerant {
        Strictness::Tolerant
    } else {
        Strictness::Strict
    };
    let script =
        Script::from_file(path, strictness).map_err(|e| format!("{}: {e}", path.display()))?;

    for (i, command) in script.commands().iter().enumerate() {
        println!("{i:>4}  {command}");
    }
    for warning in script.warnings() {
        println!("warning: {warning}");
    }
    println!(
        "{} command(s), {}",
        script.len(),
        if script.is_runnable() { "runnable" } else { "not runnable" }
    );
    Ok(())
}

fn export(
    settings: &Settings,
    path: &Path,
    output: Option<PathBuf>,
    port: Option<&str>,
) -> Result<(), String> {
    let script = Script::from_file(path, Strictness::Strict)
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let text = export_python(&script, &settings.export_options(port))
        .map_err(|e| format!("{}: {e}", path.display()))?;
    let output = output.unwrap_or_else(|| path.with_extension("py"));
    std::fs::write(&output, text).map_err(|e| format!("cannot write {}: {e}", output.display()))?;
    info!(path = %output.display(), "script exported");
    println!("Exported to Python: {}", output.display());
    Ok(())
}

fn list_commands() {
    let mut group = None;
    for spec in spec::ordered() {
        if group != Some(spec.group) {
            group = Some(spec.group);
            println!("\n[{}]", spec.group);
        }
        println!("  {:<20} {}", spec.name, spec.doc);
        if !spec.required.is_empty() {
            println!("  {:<20} required: {}", "", spec.required.join(", "));
        }
        for arg in spec.args.iter().filter(|a| !spec.required.contains(&a.key)) {
            let default = arg.default.map(|d| format!(" (default {d})")).unwrap_or_default();
            println!("  {:<20}   {}{default}: {}", "", arg.key, arg.help);
        }
    }
}

// ── serial utilities ──────────────────────────────────────────────────────────

fn set_channel(settings: &Settings, serial: Option<String>, channel: u8) -> Result<(), String> {
    let path = serial
        .or_else(|| settings.serial.port.clone())
        .ok_or("no serial port given and none in settings")?;
    let backend = SerialBackend::open(&path, settings.serial.baud, settings.serial.options())
        .map_err(|e| format!("{path}: {e}"))?;
    backend.send_channel_set(channel).map_err(|e| e.to_string())?;
    println!("Sent channel set: 0x{channel:02X} (power cycle receiver required)");
    Ok(())
}

fn list_ports() -> Result<(), String> {
    let ports = serialport::available_ports().map_err(|e| e.to_string())?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}
