//! Configuration from `.env` files and the process environment.

use std::sync::Mutex;
use std::time::Duration;

use evo_forwarder::config::{self, load_dotenv};
use evo_forwarder::{Address, ConfigError, Network};
use once_cell::sync::Lazy;
use tempfile::TempDir;

static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const KEYS: &[&str] = &[
    "FORWARDER_WALLET_URL",
    "FORWARDER_PLATFORM_URL",
    "FORWARDER_DATA_DIR",
    "FORWARDER_SETTLE_SECS",
    "FORWARDER_NAME_PREFIX",
];

fn clean_env() -> std::sync::MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    for key in KEYS {
        std::env::remove_var(key);
    }
    guard
}

fn args(address: &str, rest: &[&str]) -> Vec<String> {
    std::iter::once(address).chain(rest.iter().copied()).map(str::to_string).collect()
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[test]
fn dotenv_fills_unset_variables_only() {
    let _guard = clean_env();
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(".env");
    std::fs::write(
        &path,
        "# forwarder\nFORWARDER_WALLET_URL=http://wallet:19998\nFORWARDER_SETTLE_SECS=\"5\"\nFORWARDER_NAME_PREFIX=kept\n",
    )
    .unwrap();
    std::env::set_var("FORWARDER_NAME_PREFIX", "from-env");

    load_dotenv(&path);

    assert_eq!(std::env::var("FORWARDER_WALLET_URL").unwrap(), "http://wallet:19998");
    assert_eq!(std::env::var("FORWARDER_SETTLE_SECS").unwrap(), "5");
    assert_eq!(std::env::var("FORWARDER_NAME_PREFIX").unwrap(), "from-env");

    let to = Address::p2pkh(&Network::Testnet, [9; 20]).to_string();
    let cfg = config::resolve(&args(&to, &["testnet"]), process_env).unwrap();
    assert_eq!(cfg.wallet_url, "http://wallet:19998");
    assert_eq!(cfg.settle_delay, Duration::from_secs(5));
    assert_eq!(cfg.name_prefix, "from-env");
    assert!(cfg.platform_url.is_none());

    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn missing_dotenv_is_ignored() {
    let _guard = clean_env();
    let dir = TempDir::new().expect("tempdir");
    load_dotenv(&dir.path().join("absent.env"));
    assert!(std::env::var("FORWARDER_WALLET_URL").is_err());
}

#[test]
fn data_dir_locates_checkpoints() {
    let _guard = clean_env();
    let dir = TempDir::new().expect("tempdir");
    std::env::set_var("FORWARDER_DATA_DIR", dir.path());

    let main = Address::p2pkh(&Network::Main, [9; 20]).to_string();
    let cfg = config::resolve(&args(&main, &[]), process_env).unwrap();
    assert_eq!(cfg.network, Network::Main);
    assert_eq!(cfg.checkpoints_path(), Some(dir.path().join("checkpoints.txt")));
    assert_eq!(cfg.wallet_url, "http://127.0.0.1:9998");

    let test = Address::p2pkh(&Network::Regtest, [9; 20]).to_string();
    let cfg = config::resolve(&args(&test, &["regtest"]), process_env).unwrap();
    assert_eq!(cfg.checkpoints_path(), None);

    std::env::remove_var("FORWARDER_DATA_DIR");
}

#[test]
fn bad_settle_delay_is_rejected() {
    let _guard = clean_env();
    std::env::set_var("FORWARDER_SETTLE_SECS", "soon");
    let main = Address::p2pkh(&Network::Main, [9; 20]).to_string();
    let err = config::resolve(&args(&main, &[]), process_env).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "FORWARDER_SETTLE_SECS", .. }));
    std::env::remove_var("FORWARDER_SETTLE_SECS");
}
