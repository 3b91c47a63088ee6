//! Launcher flags and environment overrides.
//!
//! Every flag has a `NODECOIN_*` environment twin with the same effect; the
//! flag wins when both are set (clap's standard precedence).

use std::path::PathBuf;

use clap::Parser;

use nodecoin_engine::content::Biome;

/// A Nodecoin settlement node.
#[derive(Debug, Clone, Parser)]
#[command(name = "nodecoin", version, about = "Distributed settlement node")]
pub struct NodeConfig {
    /// Display name of the settlement.
    #[arg(long, env = "NODECOIN_NAME", default_value = "Settler")]
    pub name: String,

    /// Player id. Derived from the node address when omitted.
    #[arg(long, env = "NODECOIN_ID")]
    pub id: Option<String>,

    /// Settlement biome.
    #[arg(long, env = "NODECOIN_BIOME", default_value = "plains")]
    pub biome: Biome,

    /// Deterministic identity/world seed. Random when omitted.
    #[arg(long, env = "NODECOIN_SEED")]
    pub seed: Option<String>,

    /// Where the database and identity files live.
    #[arg(long, env = "NODECOIN_DATA_DIR", default_value = "./nodecoin-data")]
    pub data_dir: PathBuf,

    /// Listen port handed to the transport layer.
    #[arg(long, env = "NODECOIN_PORT", default_value_t = 9400)]
    pub port: u16,

    /// Comma-separated multiaddrs to dial at startup.
    #[arg(long, env = "NODECOIN_BOOTSTRAP", value_delimiter = ',')]
    pub bootstrap: Vec<String>,

    /// Run without networking (local simulation only).
    #[arg(long, env = "NODECOIN_NO_P2P", default_value_t = false)]
    pub no_p2p: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = NodeConfig::parse_from(["nodecoin"]);
        assert_eq!(config.name, "Settler");
        assert_eq!(config.biome, Biome::Plains);
        assert_eq!(config.port, 9400);
        assert!(config.bootstrap.is_empty());
        assert!(!config.no_p2p);
    }

    #[test]
    fn flags_parse() {
        let config = NodeConfig::parse_from([
            "nodecoin",
            "--name",
            "Alba",
            "--biome",
            "volcanic",
            "--seed",
            "s-1",
            "--port",
            "9999",
            "--bootstrap",
            "/ip4/10.0.0.1/tcp/9400,/ip4/10.0.0.2/tcp/9400",
            "--no-p2p",
        ]);
        assert_eq!(config.name, "Alba");
        assert_eq!(config.biome, Biome::Volcanic);
        assert_eq!(config.seed.as_deref(), Some("s-1"));
        assert_eq!(config.port, 9999);
        assert_eq!(config.bootstrap.len(), 2);
        assert!(config.no_p2p);
    }

    #[test]
    fn bad_biome_rejected() {
        assert!(NodeConfig::try_parse_from(["nodecoin", "--biome", "swamp"]).is_err());
    }
}
