//! Configuration resolver: positional arguments pick the network and the
//! forwarding address, environment variables (optionally from `.env`) supply
//! service endpoints and timings.

pub mod network;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::Address;
use crate::error::ConfigError;

pub use network::{AddressVersions, DevnetParams, Network};

pub const USAGE: &str = "Usage: address-to-send-back-to [regtest|testnet|evonet|palinka|mobile|devnet] [devnet-name] [devnet-sporkaddress] [devnet-port] [devnet-dnsseed...]";

pub const DEFAULT_SETTLE_SECS: u64 = 30;
pub const DEFAULT_NAME_PREFIX: &str = "hashengineering";

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub network: Network,
    pub forwarding_address: Address,
    pub wallet_url: String,
    pub platform_url: Option<String>,
    pub data_dir: PathBuf,
    pub settle_delay: Duration,
    pub name_prefix: String,
}

impl ForwarderConfig {
    /// Path of the checkpoint file, when the network ships one.
    pub fn checkpoints_path(&self) -> Option<PathBuf> {
        self.network.checkpoints().map(|name| self.data_dir.join(name))
    }
}

/// Pick the network profile from `args` (without the program name).
/// Anything unrecognised, including incomplete devnet arguments, is main net.
pub fn resolve_network(args: &[String]) -> Network {
    let Some(selector) = args.get(1) else { return Network::Main };
    if selector == "devnet" {
        if args.len() > 6 {
            if let Ok(port) = args[4].parse::<u16>() {
                return Network::Devnet(DevnetParams {
                    name: args[2].clone(),
                    spork_address: args[3].clone(),
                    port,
                    dns_seeds: args[5..].to_vec(),
                });
            }
            tracing::warn!("devnet port '{}' is not a number, using main network", args[4]);
        }
        return Network::Main;
    }
    Network::from_selector(selector).unwrap_or_default()
}

/// Resolve the full configuration. `env` is consulted for overrides so tests
/// can pass a map instead of touching the process environment.
pub fn resolve<F>(args: &[String], env: F) -> Result<ForwarderConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw_address = args.first().ok_or(ConfigError::MissingAddress)?;
    let network = resolve_network(args);
    let forwarding_address = Address::from_base58(&network, raw_address)?;

    let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let settle_delay = match var("FORWARDER_SETTLE_SECS") {
        Some(v) => Duration::from_secs(
            v.trim().parse().map_err(|_| ConfigError::InvalidValue { key: "FORWARDER_SETTLE_SECS", value: v })?,
        ),
        None => Duration::from_secs(DEFAULT_SETTLE_SECS),
    };

    Ok(ForwarderConfig {
        wallet_url: var("FORWARDER_WALLET_URL")
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", network.default_rpc_port())),
        platform_url: var("FORWARDER_PLATFORM_URL"),
        data_dir: var("FORWARDER_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        settle_delay,
        name_prefix: var("FORWARDER_NAME_PREFIX").unwrap_or_else(|| DEFAULT_NAME_PREFIX.into()),
        network,
        forwarding_address,
    })
}

/// Load `KEY=VALUE` lines into the process environment without overriding
/// variables that are already set. Missing file is not an error.
pub fn load_dotenv(path: &Path) {
    let Ok(contents) = std::fs::read_to_string(path) else { return };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && std::env::var(key.trim()).is_err() {
                std::env::set_var(key.trim(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn main_address() -> String {
        Address::p2pkh(&Network::Main, [4u8; 20]).to_string()
    }

    fn test_address() -> String {
        Address::p2pkh(&Network::Testnet, [4u8; 20]).to_string()
    }

    fn no_env(_: &str) -> Option<String> { None }

    #[test]
    fn missing_address_is_an_error() {
        assert!(matches!(resolve(&[], no_env), Err(ConfigError::MissingAddress)));
    }

    #[test]
    fn absent_or_unknown_selector_defaults_to_main() {
        let addr = main_address();
        assert_eq!(resolve_network(&args(&[&addr])), Network::Main);
        assert_eq!(resolve_network(&args(&[&addr, "bogus"])), Network::Main);
        let config = resolve(&args(&[&addr]), no_env).unwrap();
        assert_eq!(config.network.file_prefix(), "forwarding-service");
        assert_eq!(config.checkpoints_path(), Some(PathBuf::from("./checkpoints.txt")));
    }

    #[test]
    fn devnet_needs_a_dns_seed() {
        let addr = test_address();
        let short = args(&[&addr, "devnet", "dev", "yspork", "20001"]);
        assert_eq!(resolve_network(&short), Network::Main);

        let full = args(&[&addr, "devnet", "dev", "yspork", "20001", "seed1", "seed2"]);
        match resolve_network(&full) {
            Network::Devnet(p) => {
                assert_eq!(p.name, "dev");
                assert_eq!(p.port, 20001);
                assert_eq!(p.dns_seeds, vec!["seed1".to_string(), "seed2".to_string()]);
            }
            other => panic!("expected devnet, got {:?}", other),
        }
    }

    #[test]
    fn devnet_with_bad_port_falls_back_to_main() {
        let addr = test_address();
        let a = args(&[&addr, "devnet", "dev", "yspork", "port", "seed1", "seed2"]);
        assert_eq!(resolve_network(&a), Network::Main);
    }

    #[test]
    fn address_must_match_selected_network() {
        let addr = main_address();
        let err = resolve(&args(&[&addr, "testnet"]), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Address(_)));
        assert!(resolve(&args(&[&test_address(), "testnet"]), no_env).is_ok());
    }

    #[test]
    fn env_overrides_endpoints_and_timings() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FORWARDER_WALLET_URL", "http://wallet:1"),
            ("FORWARDER_PLATFORM_URL", "http://platform:2"),
            ("FORWARDER_SETTLE_SECS", "5"),
            ("FORWARDER_NAME_PREFIX", "evonaut"),
        ]);
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let config = resolve(&args(&[&test_address(), "regtest"]), lookup).unwrap();
        assert_eq!(config.wallet_url, "http://wallet:1");
        assert_eq!(config.platform_url.as_deref(), Some("http://platform:2"));
        assert_eq!(config.settle_delay, Duration::from_secs(5));
        assert_eq!(config.name_prefix, "evonaut");
    }

    #[test]
    fn defaults_without_env() {
        let config = resolve(&args(&[&test_address(), "regtest"]), no_env).unwrap();
        assert_eq!(config.wallet_url, "http://127.0.0.1:19898");
        assert_eq!(config.platform_url, None);
        assert_eq!(config.settle_delay, Duration::from_secs(DEFAULT_SETTLE_SECS));
        assert_eq!(config.name_prefix, DEFAULT_NAME_PREFIX);
    }

    #[test]
    fn bad_settle_value_is_rejected() {
        let lookup = |k: &str| (k == "FORWARDER_SETTLE_SECS").then(|| "soon".to_string());
        let err = resolve(&args(&[&test_address(), "regtest"]), lookup).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "FORWARDER_SETTLE_SECS", .. }));
    }
}
