//! evo-forwarder CLI
//!
//!   evo-forwarder <address> [regtest|testnet|evonet|palinka|mobile|devnet] [devnet args...]
//!
//! Waits for payments to the wallet. Each one funds a platform identity at
//! one confirmation and is swept to <address> at two. Runs until Ctrl-C.
//!
//! Endpoints and timings come from the environment (a `.env` file in the
//! working directory is read first):
//!   FORWARDER_WALLET_URL     wallet service JSON-RPC endpoint
//!   FORWARDER_PLATFORM_URL   platform gateway; unset skips identities
//!   FORWARDER_DATA_DIR       wallet file directory (default .)
//!   FORWARDER_SETTLE_SECS    wait before registering an identity (default 30)
//!   FORWARDER_NAME_PREFIX    name prefix (default hashengineering)

use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use evo_forwarder::config::{self, USAGE};
use evo_forwarder::logging::init_logging;
use evo_forwarder::platform::rpc::DapiClient;
use evo_forwarder::wallet::rpc::RpcWallet;
use evo_forwarder::{
    build_report, install_signal_handlers, ConfigError, Forwarder, ForwarderConfig, ForwarderSettings, PlatformClient,
    WalletSession,
};

fn main() {
    config::load_dotenv(Path::new(".env"));
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return;
    }

    let config = match config::resolve(&args, |key| env::var(key).ok()) {
        Ok(config) => config,
        Err(ConfigError::MissingAddress) => {
            eprintln!("{}", USAGE);
            return;
        }
        Err(e) => {
            eprintln!("{}", USAGE);
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn serve(config: ForwarderConfig) -> anyhow::Result<()> {
    println!("Network: {}", config.network.id());
    println!("Forwarding address: {}", config.forwarding_address);

    let shutdown = install_signal_handlers();

    let wallet = RpcWallet::from_config(&config).context("wallet service client")?;
    wallet.watcher().cancel_on(&shutdown);
    let wallet: Arc<dyn WalletSession> = Arc::new(wallet);

    let platform: Option<Arc<dyn PlatformClient>> = match &config.platform_url {
        Some(url) => Some(Arc::new(DapiClient::connect(url.clone()).context("platform gateway client")?)),
        None => {
            warn!("FORWARDER_PLATFORM_URL not set, identity registration disabled");
            None
        }
    };

    // Subscribe before the wallet starts delivering payments.
    let forwarder = Forwarder::new(wallet.clone(), platform.clone(), ForwarderSettings::from_config(&config));

    wallet.start().await.context("starting wallet")?;

    let receive = wallet.current_receive_address().await.context("receive address")?;
    println!("Send coins to: {}", receive);
    println!("Waiting for coins to arrive. Press Ctrl-C to quit.");

    if let Some(platform) = &platform {
        match build_report(wallet.as_ref(), platform.as_ref(), &config.name_prefix).await {
            Ok(report) => println!("{}", report),
            Err(e) => warn!("startup report unavailable: {}", e),
        }
    }

    forwarder.run(shutdown).await?;
    info!("forwarder stopped");
    Ok(())
}
