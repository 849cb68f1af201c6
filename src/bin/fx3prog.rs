//! Command-line front end: argument parsing, logger setup, and translating
//! [`fx3prog::FxError`] into process exit codes. All device logic lives in
//! the library; this binary only wires it to a terminal.

use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};
use simplelog::{LevelFilter, TermLogger, TerminalMode};
use structopt::StructOpt;

use fx3prog::device_table::DeviceTable;
use fx3prog::mode_probe::DeviceMode;
use fx3prog::{downloader, eeprom_io, FxError, HelperLoader};

#[derive(Debug, StructOpt)]
#[structopt(name = "fx3prog", about = "Provision the Domesday Duplicator's FX3 controller")]
struct Options {
    #[structopt(subcommand)]
    command: Command,

    /// Configure log level
    #[structopt(long, env = "FX3PROG_LOG")]
    log_level: Option<LevelFilter>,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// List candidate devices currently on the bus
    List,
    /// Download a RAM firmware image and jump to its entry point
    UploadRam {
        /// Firmware image to download
        path: PathBuf,

        /// Index into the device table, as shown by `list`
        #[structopt(long, default_value = "0")]
        device: usize,
    },
    /// Bring up the flash-programmer helper (if needed) and program the
    /// attached I²C EEPROM
    ProgramEeprom {
        /// Firmware image to program into EEPROM
        path: PathBuf,

        /// Index into the device table, as shown by `list`
        #[structopt(long, default_value = "0")]
        device: usize,

        /// Read every window back and compare it against `path` as it is
        /// written, instead of a bare write
        #[structopt(long)]
        verify: bool,
    },
    /// Reset the target device
    Reset {
        /// Index into the device table, as shown by `list`
        #[structopt(long, default_value = "0")]
        device: usize,
    },
}

/// A one-line summary of a discovered device, as printed by `list`.
#[derive(Debug)]
struct DeviceSummary {
    index: usize,
    vid: u16,
    pid: u16,
    bus: u8,
    address: u8,
    mode: DeviceMode,
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:04x}:{:04x} bus={:03} addr={:03} mode={:?}",
            self.index, self.vid, self.pid, self.bus, self.address, self.mode
        )
    }
}

fn main() -> ExitCode {
    let opts = Options::from_args();
    let level = fx3prog::config::cli_log_level(opts.log_level, LevelFilter::Info);
    TermLogger::init(level, simplelog::Config::default(), TerminalMode::Mixed).ok();

    match run(opts.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), FxError> {
    match command {
        Command::List => list(),
        Command::UploadRam { path, device } => upload_ram(&path, device),
        Command::ProgramEeprom { path, device, verify } => program_eeprom(&path, device, verify),
        Command::Reset { device } => reset(device),
    }
}

fn list() -> Result<(), FxError> {
    let mut table = DeviceTable::new()?;
    let count = table.discover()?;
    info!("found {count} candidate device(s)");

    for record in table.records() {
        let summary = DeviceSummary {
            index: record.index,
            vid: record.vid,
            pid: record.pid,
            bus: record.bus,
            address: record.address,
            mode: record.mode,
        };
        println!("{summary}");
    }
    Ok(())
}

fn read_image(path: &PathBuf) -> Result<Vec<u8>, FxError> {
    std::fs::read(path).map_err(|cause| FxError::FileIOFailure {
        path: path.clone(),
        cause,
    })
}

fn upload_ram(path: &PathBuf, device: usize) -> Result<(), FxError> {
    let image = read_image(path)?;
    let mut table = DeviceTable::new()?;
    table.discover()?;
    let record = table.get_mut(device)?;

    let outcome = downloader::download(&mut record.transport, &image)?;
    info!(
        "sent {} bytes, entry={:?}, complete={}",
        outcome.bytes_sent, outcome.entry_address, outcome.complete
    );
    Ok(())
}

fn program_eeprom(path: &PathBuf, device: usize, verify: bool) -> Result<(), FxError> {
    let image = read_image(path)?;
    let mut table = DeviceTable::new()?;
    table.discover()?;

    let loader = HelperLoader::default();
    let helper_index = loader.ensure(&mut table, device)?;
    let record = table.get_mut(helper_index)?;

    if verify {
        eeprom_io::program(&mut record.transport, &image)?;
        info!("programmed and verified {} bytes", image.len());
    } else {
        eeprom_io::write(&mut record.transport, &image)?;
        info!("programmed {} bytes without verification", image.len());
    }
    Ok(())
}

/// The reference tool issues a USB reset control request here; this
/// protocol has no equivalent signal, so this is documented as a no-op
/// rather than pretending to do something it doesn't.
fn reset(device: usize) -> Result<(), FxError> {
    let mut table = DeviceTable::new()?;
    table.discover()?;
    table.get(device)?;
    info!("device {device} acknowledged; no reset signal is defined by this protocol");
    Ok(())
}
