//! Command-line sender
//!
//! Connects to a printer (or to the built-in virtual controller with
//! `--dry-run`), sends any manual commands, then streams a G-Code file and
//! reports progress until the job ends.

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use printcontrol_communication::firmware::marlin::command_content;
use printcontrol_communication::{PrinterDriver, SerialChannel, VirtualController, VirtualPort};
use printcontrol_core::{
    ConnectionConfig, DataBits, DriverEvent, FlowControl, GcodeDocument, Parity, StopBits,
};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Device name used for dry runs
pub const VIRTUAL_DEVICE: &str = "virtual";

/// Stream G-Code to a 3D printer controller
#[derive(Parser, Debug, Clone)]
#[command(name = "printcontrol", version, about)]
pub struct Cli {
    /// G-Code file to print
    pub file: Option<PathBuf>,

    /// Serial device path, e.g. /dev/ttyUSB0
    #[arg(short, long)]
    pub device: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Parity: none, even or odd
    #[arg(long)]
    pub parity: Option<Parity>,

    /// Stop bits: 1 or 2
    #[arg(long)]
    pub stop_bits: Option<StopBits>,

    /// Flow control: none, software, hardware or both
    #[arg(long)]
    pub flow_control: Option<FlowControl>,

    /// Data bits: 7 or 8
    #[arg(long)]
    pub data_bits: Option<DataBits>,

    /// Connection settings file (.json or .toml); options given on the
    /// command line take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Manual command to send before printing; may be repeated
    #[arg(short = 'x', long = "exec")]
    pub exec: Vec<String>,

    /// Print document metrics without connecting
    #[arg(long)]
    pub info: bool,

    /// Stream to the built-in virtual controller instead of a serial port
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Build the connection configuration from the settings file and flags
    pub fn connection_config(&self) -> anyhow::Result<ConnectionConfig> {
        let mut config = match &self.config {
            Some(path) => ConnectionConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ConnectionConfig::default(),
        };

        if let Some(device) = &self.device {
            config.device_path = device.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(parity) = self.parity {
            config.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.stop_bits = stop_bits;
        }
        if let Some(flow_control) = self.flow_control {
            config.flow_control = flow_control;
        }
        if let Some(data_bits) = self.data_bits {
            config.data_bits = data_bits;
        }

        if config.device_path.is_empty() && self.dry_run {
            config.device_path = VIRTUAL_DEVICE.to_string();
        }
        config.validate()?;
        Ok(config)
    }

    /// Number of `--exec` lines that will actually be sent
    fn command_count(&self) -> usize {
        self.exec
            .iter()
            .filter(|line| command_content(line).is_some())
            .count()
    }
}

/// Run the sender
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.info {
        let file = cli
            .file
            .as_ref()
            .ok_or_else(|| anyhow!("--info needs a G-Code file"))?;
        let document = GcodeDocument::from_path(file)?;
        print_metrics(&document);
        return Ok(());
    }

    if cli.file.is_none() && cli.exec.is_empty() {
        bail!("nothing to do: give a G-Code file or --exec commands");
    }

    let config = cli.connection_config()?;
    let driver = PrinterDriver::new()?;
    let mut rx = driver.subscribe();

    // Keeps the simulator alive for the whole session.
    let _controller = if cli.dry_run {
        let (host, device) = VirtualPort::pair();
        let controller = VirtualController::spawn(device)?;
        driver.attach(SerialChannel::from_link(
            config.device_path.clone(),
            host.reader,
            host.writer,
        ))?;
        Some(controller)
    } else {
        driver.connect(config)?;
        None
    };

    let result = session(&cli, &driver, &mut rx).await;
    driver.disconnect()?;
    driver.shutdown();
    result
}

async fn session(
    cli: &Cli,
    driver: &PrinterDriver,
    rx: &mut broadcast::Receiver<DriverEvent>,
) -> anyhow::Result<()> {
    next_event(rx, |event| match event {
        DriverEvent::Connected(device) => {
            println!("Connected to {}", device);
            Some(Ok(()))
        }
        DriverEvent::ConnectFailed(reason) => Some(Err(anyhow!("connect failed: {}", reason))),
        _ => None,
    })
    .await??;

    let mut pending = cli.command_count();
    for line in &cli.exec {
        driver.exec(line.clone())?;
    }
    while pending > 0 {
        next_event(rx, |event| match event {
            DriverEvent::CommandSent(line) => {
                println!("> {}", line);
                Some(Ok(()))
            }
            DriverEvent::WriteFailed(reason) => Some(Err(anyhow!("write failed: {}", reason))),
            _ => None,
        })
        .await??;
        pending -= 1;
    }

    let Some(file) = &cli.file else {
        return Ok(());
    };

    driver.load_file(file.clone())?;
    next_event(rx, |event| match event {
        DriverEvent::DocumentLoaded { .. } => {
            println!("{}", event);
            Some(Ok(()))
        }
        DriverEvent::LoadFailed(reason) => Some(Err(anyhow!("load failed: {}", reason))),
        _ => None,
    })
    .await??;

    driver.run()?;
    let mut last_percent = None;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                println!("Interrupted, stopping job");
                driver.stop()?;
                return Ok(());
            }
            event = rx.recv() => match event {
                Ok(DriverEvent::JobProgress { current, total }) if total > 0 => {
                    let percent = current * 100 / total;
                    if last_percent != Some(percent) {
                        last_percent = Some(percent);
                        println!("{:3}% ({}/{})", percent, current, total);
                    }
                }
                Ok(DriverEvent::Echo(text)) => println!("echo: {}", text),
                Ok(DriverEvent::JobEnded) => {
                    println!("Job finished");
                    return Ok(());
                }
                Ok(DriverEvent::JobFailed(reason)) => bail!("job failed: {}", reason),
                Ok(DriverEvent::ReaderStopped(reason)) => bail!("connection lost: {}", reason),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} driver events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => bail!("driver stopped"),
            }
        }
    }
}

/// Wait for the first event `select` maps to a value
async fn next_event<T>(
    rx: &mut broadcast::Receiver<DriverEvent>,
    mut select: impl FnMut(&DriverEvent) -> Option<T>,
) -> anyhow::Result<T> {
    loop {
        match rx.recv().await {
            Ok(DriverEvent::Echo(text)) => println!("echo: {}", text),
            Ok(event) => {
                if let Some(value) = select(&event) {
                    return Ok(value);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} driver events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => bail!("driver stopped"),
        }
    }
}

fn print_metrics(document: &GcodeDocument) {
    println!("Lines:    {}", document.line_count());
    println!("Height:   {:.2} mm", document.height_max());
    println!("Filament: {:.2} mm", document.filament_total());
    println!("Layers:   {}", document.layer_count());
}
