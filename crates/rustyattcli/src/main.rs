use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rustyatt::att::constants::ATT_CID;
use rustyatt::{AddressType, AttClient, AttClientConfig, BdAddr, Handle, L2capAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rustyatt")]
#[command(about = "Read, write and monitor attributes on a Bluetooth LE peer")]
#[command(version)]
struct Cli {
    /// Remote device address (XX:XX:XX:XX:XX:XX)
    device: BdAddr,

    /// Local adapter address, any adapter by default
    #[arg(short, long, default_value = "00:00:00:00:00:00")]
    adapter: BdAddr,

    /// Remote address type
    #[arg(long, value_enum, default_value_t = PeerAddressType::Public)]
    address_type: PeerAddressType,

    /// Seconds to wait for each response
    #[arg(short, long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PeerAddressType {
    Public,
    Random,
}

impl From<PeerAddressType> for AddressType {
    fn from(kind: PeerAddressType) -> Self {
        match kind {
            PeerAddressType::Public => AddressType::LePublic,
            PeerAddressType::Random => AddressType::LeRandom,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Read an attribute value
    Read {
        /// Attribute handle, e.g. 0x0037
        #[arg(value_parser = parse_handle)]
        handle: Handle,
    },
    /// Write an attribute value and wait for the acknowledgement
    Write {
        /// Attribute handle
        #[arg(value_parser = parse_handle)]
        handle: Handle,

        /// Value as hex bytes, e.g. 7061726b78390d
        value: HexValue,

        /// Send a write command instead of a write request
        #[arg(long)]
        no_response: bool,
    },
    /// Print notifications from an attribute until interrupted
    Listen {
        /// Attribute handle
        #[arg(value_parser = parse_handle)]
        handle: Handle,

        /// Use indications instead of notifications
        #[arg(long)]
        indicate: bool,

        /// Write to a handle once subscribed: HANDLE=HEX, e.g. 0x003a=7061726b78390d
        #[arg(long, value_parser = parse_assignment)]
        write: Option<(Handle, HexValue)>,
    },
}

fn parse_handle(s: &str) -> Result<Handle> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let raw = u32::from_str_radix(digits, 16).with_context(|| format!("invalid handle {s}"))?;
    Ok(Handle::try_from(raw)?)
}

/// Attribute value given on the command line as hex
#[derive(Clone, Debug)]
struct HexValue(Vec<u8>);

impl FromStr for HexValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).with_context(|| format!("invalid hex value {s}"))?;
        Ok(Self(bytes))
    }
}

fn parse_assignment(s: &str) -> Result<(Handle, HexValue)> {
    let Some((handle, value)) = s.split_once('=') else {
        bail!("expected HANDLE=HEX, got {s}");
    };
    Ok((parse_handle(handle)?, value.parse()?))
}

/// Render a value the way a serial-style peer would print it
fn printable(value: &[u8]) -> String {
    value
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    let local = L2capAddr::new(cli.adapter, ATT_CID, AddressType::BrEdr);
    let remote = L2capAddr::new(cli.device, ATT_CID, cli.address_type.into());
    let config = AttClientConfig {
        transaction_timeout: timeout,
        ..AttClientConfig::default()
    };

    info!("Connecting to {}", remote);
    let client = AttClient::connect(&local, &remote, config)
        .await
        .with_context(|| format!("failed to connect to {}", cli.device))?;

    match cli.command {
        Commands::Read { handle } => {
            let value = client.read(handle, timeout).await?;
            println!("{}  {}", hex::encode(&value), printable(&value));
        }
        Commands::Write {
            handle,
            value: HexValue(value),
            no_response,
        } => {
            if no_response {
                client.write_command(handle, &value).await?;
            } else {
                client.write(handle, &value).await?;
            }
            info!("Wrote {} bytes to {}", value.len(), handle);
        }
        Commands::Listen {
            handle,
            indicate,
            write,
        } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let callback = move |value: &[u8]| {
                let _ = tx.send(value.to_vec());
            };

            if indicate {
                client.subscribe_indications(handle, callback).await?;
            } else {
                client.subscribe(handle, callback).await?;
            }
            info!("Listening on {}, press Ctrl-C to stop", handle);

            if let Some((target, HexValue(value))) = write {
                client.write(target, &value).await?;
            }

            loop {
                tokio::select! {
                    value = rx.recv() => match value {
                        Some(value) => println!("{}: {}", handle, printable(&value)),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }

                if !client.is_connected() {
                    warn!("Connection to {} lost", cli.device);
                    break;
                }
            }

            if client.is_connected() {
                if let Err(e) = client.unsubscribe(handle).await {
                    warn!("Failed to unsubscribe from {}: {}", handle, e);
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}
