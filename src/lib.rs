//! evo-forwarder: forwards confirmed payments and founds platform identities
//! from them.
//!
//! # Architecture
//!
//! ```text
//! bin/main.rs
//!   │  config::resolve (args + env) ──► ForwarderConfig
//!   │
//!   ├── WalletSession (trait)          PlatformClient (trait)
//!   │     ├── wallet::rpc::RpcWallet     ├── platform::rpc::DapiClient
//!   │     └── sim::SimWallet             └── sim::SimPlatform
//!   │
//!   ├── report::build_report           (startup, read-only)
//!   │
//!   └── workflow::Forwarder            (event loop until Shutdown)
//!         ├── depth 1 ─► funding       burn credits for a fresh auth key
//!         └── depth 2 ─► forward       sweep to the forwarding address
//!                          └─► registration (spawned)
//! ```
//!
//! # Features
//!
//! - `rpc` (default) - JSON-RPC adapters for the wallet service and the
//!   platform gateway, and the `evo-forwarder` binary.

pub mod address;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod report;
#[cfg(feature = "rpc")]
pub mod rpc;
pub mod runtime;
pub mod sim;
pub mod wallet;
pub mod watcher;
pub mod workflow;

pub use address::{Address, AddressKind};
pub use config::{ForwarderConfig, Network};
pub use error::{ConfigError, PlatformError, WalletError, WatchError, WorkflowError};
pub use platform::PlatformClient;
pub use report::{build_report, StartupReport};
pub use runtime::{install_signal_handlers, Shutdown, StopCause};
pub use wallet::{Coin, WalletSession};
pub use watcher::ConfirmationWatcher;
pub use workflow::{Forwarder, ForwarderSettings, RegistrationReport};
