use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeplug_link::{
    cp_device::{get_sink, get_source},
    radio::{
        cps_mode::packet::layer2::{SELECTOR_RADIO_ID, SELECTOR_UNKNOWN_1},
        profile::SessionProfile,
    },
    transport::UsbTransport,
    ChecksumPolicy, CpsProfile, FirmwareProfile, OpenMode, Radio, SessionConfig, StringQuery,
    CODEPLUG_SIZE,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(version)]
/// Read and write Hytera radio codeplugs over USB.
struct Args {
    /// Log all commands sent to and received from the radio.
    #[arg(short, long)]
    verbose: bool,

    /// USB transfer timeout in milliseconds. Defaults to 4s in CPS mode and
    /// 10s in firmware mode.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Fail on checksum mismatches instead of logging them.
    #[arg(long)]
    strict_checksums: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dump a codeplug memory image to a file.
    DumpCpMemory {
        /// Output file where the codeplug data will be written.
        path: PathBuf,
    },

    /// Write a codeplug image back into codeplug memory.
    WriteCpMemory {
        /// Input codeplug image file.
        path: PathBuf,
    },

    /// Dump a codeplug memory image to a file via firmware update mode.
    FwDumpCpMemory {
        /// Output file where the codeplug data will be written.
        path: PathBuf,
    },

    /// Write a codeplug image back to the codeplug memory via firmware update mode.
    FwWriteCpMemory {
        /// Input codeplug image file.
        path: PathBuf,
    },

    /// Print the radio's program mode header, radio id and version.
    Identify,

    /// Read a range of codeplug memory into a file.
    ReadRange {
        /// Start address, hex.
        #[arg(value_parser = parse_hex)]
        addr: u32,

        /// Number of bytes, hex.
        #[arg(value_parser = parse_hex)]
        len: u32,

        /// File the data is written to.
        output: PathBuf,

        /// Read from this codeplug image instead of the radio.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Talk to the radio in firmware update mode.
        #[arg(long)]
        firmware: bool,
    },

    /// Write the contents of a file into a range of codeplug memory.
    WriteRange {
        /// Start address, hex.
        #[arg(value_parser = parse_hex)]
        addr: u32,

        /// File holding the data to write.
        input: PathBuf,

        /// Write into this codeplug image instead of the radio.
        #[arg(long)]
        image: Option<PathBuf>,

        /// Talk to the radio in firmware update mode.
        #[arg(long)]
        firmware: bool,
    },
}

fn parse_hex(s: &str) -> std::result::Result<u32, std::num::ParseIntError> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");

    u32::from_str_radix(s, 16)
}

fn pb_style() -> Result<ProgressStyle> {
    Ok(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {percent}% {msg}")?
            .progress_chars("##-"),
    )
}

fn progress_bar(msg: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(CODEPLUG_SIZE as u64);
    pb.set_style(pb_style()?);
    pb.set_message(msg);

    Ok(pb)
}

fn write_codeplug_image<P: SessionProfile>(
    path: &Path,
    config: SessionConfig,
    msg: &'static str,
) -> Result<()> {
    let mut in_file = File::open(path).context("Could not open input file")?;
    let mut buf = vec![];

    in_file
        .read_to_end(&mut buf)
        .context("Failed to read input data")?;

    let pb = progress_bar(msg)?;
    let mut radio = Radio::<P, UsbTransport>::open_usb(config, OpenMode::Write)
        .context("Failed to open radio")?;

    pb.wrap_write(&mut radio)
        .write_all(&buf)
        .context("Failed to write data to radio")?;

    pb.finish();

    radio.close().context("Failed to leave programming mode")
}

fn dump_codeplug_image<P: SessionProfile>(
    path: &Path,
    config: SessionConfig,
    msg: &'static str,
) -> Result<()> {
    let pb = progress_bar(msg)?;
    let mut radio = Radio::<P, UsbTransport>::open_usb(config, OpenMode::Read)
        .context("Failed to open radio")?;
    let mut out_file = File::create(path).context("Could not open output file")?;
    let mut buf = vec![];

    pb.wrap_read(&mut radio)
        .read_to_end(&mut buf)
        .context("Failed to read data from radio")?;

    pb.finish();

    radio.close().context("Failed to leave programming mode")?;

    out_file
        .write_all(&buf)
        .context("Could not write data to output file")?;

    Ok(())
}

fn identify(config: SessionConfig) -> Result<()> {
    let mut radio = Radio::<CpsProfile, UsbTransport>::open_usb(config, OpenMode::Read)
        .context("Failed to open radio")?;

    let radio_id = radio
        .get_string(StringQuery::RadioId, SELECTOR_RADIO_ID)
        .context("Failed to query radio id")?;
    let version = radio
        .get_string(StringQuery::Version, SELECTOR_UNKNOWN_1)
        .context("Failed to query version")?;

    if let Some(head) = radio.head_data() {
        println!("Header:   {}", hex(head));
    }
    println!("Radio ID: {radio_id}");
    println!("Version:  {version}");

    radio.close().context("Failed to leave programming mode")
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn read_range<P: SessionProfile + 'static>(
    addr: u32,
    len: u32,
    output: &Path,
    image: Option<&Path>,
    config: SessionConfig,
) -> Result<()> {
    let mut src = get_source::<P>(image, config).context("Could not open source")?;
    let data = src
        .read_at(addr, len as u64)
        .with_context(|| format!("Failed to read {len:#x} bytes at {addr:#010x}"))?;

    drop(src);

    std::fs::write(output, data).context("Could not write output file")
}

fn write_range<P: SessionProfile + 'static>(
    addr: u32,
    input: &Path,
    image: Option<&Path>,
    config: SessionConfig,
) -> Result<()> {
    let data = std::fs::read(input).context("Could not read input file")?;
    let mut dst = get_sink::<P>(image, config).context("Could not open output")?;

    dst.write_at(addr, &data)
        .with_context(|| format!("Failed to write {:#x} bytes at {addr:#010x}", data.len()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Could not set up logging")?;

    let mut config = SessionConfig::default();

    if let Some(ms) = args.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }

    if args.strict_checksums {
        config = config.with_checksum_policy(ChecksumPolicy::Strict);
    }

    match args.command {
        Commands::DumpCpMemory { path } => {
            dump_codeplug_image::<CpsProfile>(&path, config, "Read Codeplug (CPS)")
        }
        Commands::WriteCpMemory { path } => {
            write_codeplug_image::<CpsProfile>(&path, config, "Write Codeplug (CPS)")
        }
        Commands::FwDumpCpMemory { path } => {
            dump_codeplug_image::<FirmwareProfile>(&path, config, "Read Codeplug (FW)")
        }
        Commands::FwWriteCpMemory { path } => {
            write_codeplug_image::<FirmwareProfile>(&path, config, "Write Codeplug (FW)")
        }
        Commands::Identify => identify(config),
        Commands::ReadRange {
            addr,
            len,
            output,
            image,
            firmware,
        } => {
            if firmware {
                read_range::<FirmwareProfile>(addr, len, &output, image.as_deref(), config)
            } else {
                read_range::<CpsProfile>(addr, len, &output, image.as_deref(), config)
            }
        }
        Commands::WriteRange {
            addr,
            input,
            image,
            firmware,
        } => {
            if firmware {
                write_range::<FirmwareProfile>(addr, &input, image.as_deref(), config)
            } else {
                write_range::<CpsProfile>(addr, &input, image.as_deref(), config)
            }
        }
    }
}
