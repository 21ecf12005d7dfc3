use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing_subscriber::EnvFilter;

use pcmeter::app::{DriverState, MeterDriver, TickOutcome, TICK_INTERVAL};
use pcmeter::config::{ConfigProvider, Settings};
use pcmeter::instance::InstanceGuard;
use pcmeter::monitor::MetricSampler;
use pcmeter::serial::{self, PortConfig, SerialChannel};
use pcmeter::ui::ConsoleStatus;

fn print_usage() {
    eprintln!("Usage: pcmeter [OPTIONS] [PORT]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  PORT           Optional: serial port to use and remember");
    eprintln!("                 (e.g. COM3 or /dev/ttyUSB0)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --list-ports   List available serial ports and exit");
    eprintln!("  --no-serial    Run display-only, without opening the port");
    eprintln!("  -h, --help     Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  pcmeter                  # Use the saved port");
    eprintln!("  pcmeter COM4             # Use COM4 and save it as the default");
    eprintln!("  pcmeter --no-serial      # Readings only, no device attached");
}

struct Options {
    port: Option<String>,
    list_ports: bool,
    no_serial: bool,
}

fn parse_args() -> Options {
    let mut options = Options {
        port: None,
        list_ports: false,
        no_serial: false,
    };

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "--list-ports" => options.list_ports = true,
            "--no-serial" => options.no_serial = true,
            other if other.starts_with('-') => {
                eprintln!("Unknown option: {}", other);
                print_usage();
                std::process::exit(1);
            }
            other => options.port = Some(other.to_string()),
        }
    }

    options
}

fn main() {
    let options = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if options.list_ports {
        match serial::available_port_names() {
            Ok(names) if names.is_empty() => println!("No serial ports found."),
            Ok(names) => {
                for name in names {
                    println!("{}", name);
                }
            }
            Err(e) => {
                eprintln!("Failed to enumerate serial ports: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Two instances would interleave frames on the same port.
    let _instance = match InstanceGuard::acquire() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}. Program will close.", e);
            std::process::exit(1);
        }
    };

    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(port) = &options.port {
        settings.set_meter_com_port(port);
        if let Err(e) = settings.save() {
            eprintln!("Warning: could not save settings: {}", e);
        }
    }

    let sampler = match MetricSampler::init() {
        Ok(sampler) => sampler,
        Err(e) => {
            eprintln!(
                "The performance counter(s) could not be initialized. The program cannot continue. ({})",
                e
            );
            std::process::exit(1);
        }
    };

    let mut driver = MeterDriver::new(sampler, SerialChannel::new(), Box::new(ConsoleStatus::new()));

    // Connect on startup; a failure is reported and the meter keeps
    // running display-only.
    if !options.no_serial {
        driver.connect(&PortConfig::new(settings.meter_com_port()));
    }

    driver.start();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        }) {
            eprintln!("Failed to install Ctrl-C handler: {}", e);
            std::process::exit(1);
        }
    }

    // Cooperative tick loop: one tick runs to completion, then sleep out
    // the remainder of the period, so ticks never overlap.
    while running.load(Ordering::SeqCst) && driver.state() == DriverState::Running {
        let started = Instant::now();

        if driver.tick() == TickOutcome::Fatal {
            driver.shutdown();
            std::process::exit(1);
        }

        thread::sleep(TICK_INTERVAL.saturating_sub(started.elapsed()));
    }

    driver.shutdown();
}
