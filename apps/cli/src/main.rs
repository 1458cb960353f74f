use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use xpress_core::{ProductString, Timeouts, UsbXpress};

#[derive(Parser, Debug)]
#[command(author, version, about = "USBXpress bulk-transfer host tool", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Read/write timeout in milliseconds (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Timeout configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached USB devices
    List,
    /// Show descriptor strings for one device
    Info {
        /// Device index from `list`
        index: usize,
    },
    /// Read up to LEN bytes from a device and hex-dump them
    Read {
        /// Device index from `list`
        index: usize,
        /// Maximum number of bytes to read
        #[arg(default_value_t = 64)]
        len: usize,
    },
    /// Write hex-encoded bytes to a device
    Write {
        /// Device index from `list`
        index: usize,
        /// Bytes to send, as hex (e.g. "01ff3c")
        hex: String,
    },
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut ctx = UsbXpress::new();

    if let Some(path) = &args.config {
        let timeouts = Timeouts::load_from_file(path)
            .with_context(|| format!("loading timeouts from {}", path.display()))?;
        ctx.set_timeouts(timeouts.read_ms, timeouts.write_ms);
    }
    if let Some(ms) = args.timeout_ms {
        ctx.set_timeouts(ms, ms);
    }

    match args.command {
        Command::List => {
            let count = ctx.device_count()?;
            info!(count, "enumeration complete");
            for index in 0..count {
                let vid = ctx.product_string(index, ProductString::Vid)?;
                let pid = ctx.product_string(index, ProductString::Pid)?;
                let serial = ctx.product_string(index, ProductString::SerialNumber)?;
                let desc = ctx.product_string(index, ProductString::Description)?;
                println!("{index}: {vid}:{pid} {serial} {desc}");
            }
        }
        Command::Info { index } => {
            ctx.device_count()?;
            println!("vid:          {}", ctx.product_string(index, ProductString::Vid)?);
            println!("pid:          {}", ctx.product_string(index, ProductString::Pid)?);
            println!(
                "serial:       {}",
                ctx.product_string(index, ProductString::SerialNumber)?
            );
            println!(
                "description:  {}",
                ctx.product_string(index, ProductString::Description)?
            );
            println!(
                "link name:    {}",
                ctx.product_string(index, ProductString::LinkName)?
            );
        }
        Command::Read { index, len } => {
            ctx.device_count()?;
            let mut session = ctx.open(index)?;
            let mut buf = vec![0u8; len];
            let n = session.read(&mut buf)?;
            session.close();
            for chunk in buf[..n].chunks(16) {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                println!("{}", hex.join(" "));
            }
            info!(bytes = n, "read complete");
        }
        Command::Write { index, hex } => {
            let data = parse_hex(&hex)?;
            ctx.device_count()?;
            let mut session = ctx.open(index)?;
            let written = session.write(&data)?;
            session.close();
            info!(requested = data.len(), written, "write complete");
            if written < data.len() {
                bail!("short write: {written} of {} bytes", data.len());
            }
        }
    }
    Ok(())
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        bail!("hex input has an odd number of digits");
    }
    (0..cleaned.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&cleaned[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte {:?}", &cleaned[i..i + 2]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_hex;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("01ff3c").unwrap(), vec![0x01, 0xFF, 0x3C]);
        assert_eq!(parse_hex("01 ff 3c").unwrap(), vec![0x01, 0xFF, 0x3C]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
