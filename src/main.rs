use anyhow::{bail, Context};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use tinygkit::cli::{classify, Cli, ConsoleInput};
use tinygkit::{
    format_event, init_logging, list_ports, load_config, DriverConfig, EventFilter,
    MemoryMachineModel, RoutingEvent, TinygDriver, BUILD_DATE, VERSION,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    tracing::info!("tinygkit {} (built {})", VERSION, BUILD_DATE);

    if cli.list {
        for port in list_ports()? {
            println!("{}\t{}", port.port_name, port.description);
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DriverConfig::default(),
    };
    let Some(port) = cli.port.as_deref() else {
        bail!("--port is required");
    };

    let driver = TinygDriver::new(config, Arc::new(MemoryMachineModel::new()));
    let verbose = cli.verbose;
    driver.subscribe(EventFilter::All, move |event| {
        let noisy = matches!(
            event,
            RoutingEvent::StatusReport | RoutingEvent::BufferUpdate(_)
        );
        if verbose || !noisy {
            println!("{}", format_event(&event));
        }
    });

    if !driver.connect(port, cli.baud) {
        bail!("could not connect to {} at {} baud", port, cli.baud);
    }

    if let Some(path) = &cli.file {
        let program = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let queued = driver.send_file(program.lines())?;
        println!("queued {} lines from {}", queued, path.display());
    }

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let sent = match classify(&line) {
            ConsoleInput::Empty => Ok(()),
            ConsoleInput::Quit => break,
            ConsoleInput::Control(signal) => driver.send_control(signal),
            ConsoleInput::Command(command) => driver.write(command),
        };
        if let Err(e) = sent {
            eprintln!("{}", e);
            if !driver.is_connected() {
                break;
            }
        }
    }

    driver.disconnect();
    Ok(())
}
