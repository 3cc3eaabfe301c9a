//! SecurityAccess test client
//!
//! Requests a seed from the simulator, derives the key and sends it back.
//! A fixed key can be supplied with `--key` to exercise the rejection path.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use icsim_core::transport::{open_socketcan, parse_can_id};
use icsim_core::{SecurityTester, UnlockOutcome};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "uds-client")]
#[command(about = "Unlock the instrument cluster simulator over UDS SecurityAccess")]
struct Args {
    /// CAN interface name
    #[arg(default_value = "vcan0")]
    interface: String,

    /// Diagnostic request CAN ID
    #[arg(long, default_value = "0x7DF")]
    request_id: String,

    /// Diagnostic response CAN ID
    #[arg(long, default_value = "0x7E8")]
    response_id: String,

    /// Per-response timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Send this key (one hex byte, e.g. "96") instead of the derived one
    #[arg(short, long)]
    key: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "uds_client=debug,icsim_core=debug"
    } else {
        "uds_client=info,icsim_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let request_id = parse_can_id(&args.request_id)
        .with_context(|| format!("Invalid request ID '{}'", args.request_id))?;
    let response_id = parse_can_id(&args.response_id)
        .with_context(|| format!("Invalid response ID '{}'", args.response_id))?;
    let key_override = args.key.as_deref().map(parse_key).transpose()?;

    let transport = open_socketcan(&args.interface)
        .with_context(|| format!("Failed to open {}", args.interface))?;

    let tester = SecurityTester::new(transport)
        .ids(request_id, response_id)
        .timeout(Duration::from_millis(args.timeout_ms));

    let outcome = match key_override {
        Some(key) => {
            tester.request_seed()?;
            tester.send_key(key)?
        }
        None => tester.unlock()?,
    };

    match outcome {
        UnlockOutcome::Unlocked => info!("Security access granted - vehicle unlocked"),
        UnlockOutcome::Rejected(nrc) => {
            warn!(nrc = format!("0x{:02X}", nrc), "Security access denied");
        }
    }

    Ok(())
}

fn parse_key(s: &str) -> Result<u8> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid key '{}'", s))?;
    match bytes.as_slice() {
        [key] => Ok(*key),
        _ => bail!("Key must be exactly one byte, got {}", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("96").unwrap(), 0x96);
        assert_eq!(parse_key("0xaa").unwrap(), 0xAA);
        assert!(parse_key("1234").is_err());
        assert!(parse_key("zz").is_err());
    }
}
