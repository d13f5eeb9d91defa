//! In-process collaborators: a wallet over a simulated chain tip and a
//! platform backed by an in-memory document store. They implement the same
//! traits as the JSON-RPC adapters and drive the test-suite.

mod platform;
mod wallet;

pub use platform::SimPlatform;
pub use wallet::{SimWallet, SIM_FEE};
