//! Network profiles. Each network gets its own parameter set and wallet files.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Main,
    Testnet,
    Regtest,
    Palinka,
    Mobile,
    Evonet,
    Devnet(DevnetParams),
}

/// Parameters of a named developer network, taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevnetParams {
    pub name: String,
    pub spork_address: String,
    pub port: u16,
    pub dns_seeds: Vec<String>,
}

/// Base58Check version bytes for pay-to-pubkey-hash and pay-to-script-hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressVersions {
    pub pubkey_hash: u8,
    pub script_hash: u8,
}

const MAIN_VERSIONS: AddressVersions = AddressVersions { pubkey_hash: 76, script_hash: 16 };
const TEST_VERSIONS: AddressVersions = AddressVersions { pubkey_hash: 140, script_hash: 19 };

impl Network {
    /// Resolve a command-line selector. Unknown selectors and `devnet`
    /// (which needs its own arguments) map to `None`.
    pub fn from_selector(selector: &str) -> Option<Self> {
        match selector {
            "testnet" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            "palinka" => Some(Network::Palinka),
            "mobile" => Some(Network::Mobile),
            "evonet" => Some(Network::Evonet),
            _ => None,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Network::Main => "main".into(),
            Network::Testnet => "test".into(),
            Network::Regtest => "regtest".into(),
            Network::Palinka => "devnet-palinka".into(),
            Network::Mobile => "devnet-mobile".into(),
            Network::Evonet => "devnet-evonet".into(),
            Network::Devnet(p) => format!("devnet-{}", p.name),
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            Network::Main => "forwarding-service",
            Network::Testnet => "forwarding-service-testnet",
            Network::Regtest => "forwarding-service-regtest",
            Network::Palinka => "forwarding-service-palinka",
            Network::Mobile => "forwarding-service-mobile",
            Network::Evonet => "forwarding-service-evonet",
            Network::Devnet(_) => "forwarding-service-devnet",
        }
    }

    /// Checkpoint file shipped for the network, if any.
    pub fn checkpoints(&self) -> Option<&'static str> {
        match self {
            Network::Main => Some("checkpoints.txt"),
            Network::Testnet => Some("checkpoints-testnet.txt"),
            _ => None,
        }
    }

    pub fn address_versions(&self) -> AddressVersions {
        match self {
            Network::Main => MAIN_VERSIONS,
            _ => TEST_VERSIONS,
        }
    }

    /// BIP44 coin type used in key derivation paths.
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Main => 5,
            _ => 1,
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Main)
    }

    /// Regtest has no public peers; the wallet connects to a local node.
    pub fn connect_localhost(&self) -> bool {
        matches!(self, Network::Regtest)
    }

    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Network::Main => 9998,
            Network::Testnet => 19998,
            Network::Regtest => 19898,
            _ => 19798,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_resolve_to_profiles() {
        let cases = [
            ("testnet", Network::Testnet, "forwarding-service-testnet", Some("checkpoints-testnet.txt")),
            ("regtest", Network::Regtest, "forwarding-service-regtest", None),
            ("palinka", Network::Palinka, "forwarding-service-palinka", None),
            ("mobile", Network::Mobile, "forwarding-service-mobile", None),
            ("evonet", Network::Evonet, "forwarding-service-evonet", None),
        ];
        for (selector, network, prefix, checkpoints) in cases {
            let resolved = Network::from_selector(selector).expect(selector);
            assert_eq!(resolved, network);
            assert_eq!(resolved.file_prefix(), prefix);
            assert_eq!(resolved.checkpoints(), checkpoints);
        }
    }

    #[test]
    fn unknown_selector_has_no_profile() {
        assert_eq!(Network::from_selector("mainnet"), None);
        assert_eq!(Network::from_selector("devnet"), None);
    }

    #[test]
    fn main_uses_main_versions() {
        assert_eq!(Network::Main.address_versions().pubkey_hash, 76);
        assert_eq!(Network::Regtest.address_versions().pubkey_hash, 140);
        assert_eq!(Network::Main.coin_type(), 5);
        assert!(Network::Regtest.connect_localhost());
    }
}
