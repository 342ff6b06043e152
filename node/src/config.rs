//! Node configuration.
//!
//! Everything an operator can tune, serde-loadable from a JSON file. The
//! consensus-facing slices are projected into the chain and mempool configs
//! so those crates stay independent of this one.

use {
    ember_chain::{BurnFeeConfig, ChainConfig},
    ember_mempool::MempoolConfig,
    ember_types::{
        crypto::{self, Keypair},
        defs::{MOTES_PER_EMBER, PAYSPLIT_SCALE},
        Currency,
    },
    serde::{Deserialize, Serialize},
    std::path::PathBuf,
    thiserror::Error,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Blocks considered economically live.
    pub genesis_period: u64,
    /// Extra retained depth before permanent purge.
    pub fork_guard: u64,
    /// Blocks whose transaction payloads stay resident in memory.
    pub callback_horizon: u64,
    /// The paysplit ratio this node votes toward.
    pub target_paysplit: u64,
    /// Burn-fee pricing.
    pub burn_fee: BurnFeeConfig,
    /// Cap on transactions per bundled block.
    pub max_block_transactions: usize,
    /// Bootstrap parameters for a fresh chain.
    pub initial_burn_fee: Currency,
    pub initial_treasury: Currency,
    pub initial_difficulty: u64,
    /// Cadence of the block-processing loop.
    pub processing_interval_ms: u64,
    /// Cadence of the bundling loop. Must be strictly slower than
    /// processing so the two never contend on every tick.
    pub bundling_interval_ms: u64,
    /// Cadence of the persistence loop.
    pub persist_interval_ms: u64,
    /// Nonce attempts per mining tick; bounds lottery work per loop.
    pub mining_attempts_per_tick: u32,
    /// Hex-encoded 32-byte keypair seed. A random identity is generated
    /// when absent.
    pub keypair_seed: Option<String>,
    /// Data directory for block files and resume state. Memory-only when
    /// absent.
    pub data_dir: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            genesis_period: 21_600,
            fork_guard: 16,
            callback_horizon: 100,
            target_paysplit: PAYSPLIT_SCALE / 2,
            burn_fee: BurnFeeConfig::default(),
            max_block_transactions: 2_048,
            initial_burn_fee: 2 * MOTES_PER_EMBER,
            initial_treasury: 10_000_000 * MOTES_PER_EMBER,
            initial_difficulty: 0,
            processing_interval_ms: 300,
            bundling_interval_ms: 400,
            persist_interval_ms: 30_000,
            mining_attempts_per_tick: 64,
            keypair_seed: None,
            data_dir: None,
        }
    }
}

impl NodeConfig {
    /// Load from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduling model cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bundling_interval_ms <= self.processing_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "bundling interval ({} ms) must be strictly slower than the \
                 processing interval ({} ms)",
                self.bundling_interval_ms, self.processing_interval_ms
            )));
        }
        if self.target_paysplit > PAYSPLIT_SCALE {
            return Err(ConfigError::Invalid(format!(
                "target paysplit {} exceeds the scale {}",
                self.target_paysplit, PAYSPLIT_SCALE
            )));
        }
        if self.genesis_period == 0 {
            return Err(ConfigError::Invalid(
                "genesis period must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The node identity: derived from the configured seed, or random.
    pub fn keypair(&self) -> Result<Keypair, ConfigError> {
        match &self.keypair_seed {
            Some(seed_hex) => {
                let bytes = hex::decode(seed_hex)
                    .map_err(|e| ConfigError::Invalid(format!("bad keypair seed: {e}")))?;
                let seed: [u8; 32] = bytes.try_into().map_err(|_| {
                    ConfigError::Invalid("keypair seed must be 32 bytes of hex".into())
                })?;
                crypto::keypair_from_seed(&seed)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            None => Ok(crypto::generate_keypair()),
        }
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            genesis_period: self.genesis_period,
            fork_guard: self.fork_guard,
            callback_horizon: self.callback_horizon,
            target_paysplit: self.target_paysplit,
        }
    }

    pub fn mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            burn_fee: self.burn_fee.clone(),
            max_block_transactions: self.max_block_transactions,
            genesis_period: self.genesis_period,
            target_paysplit: self.target_paysplit,
            initial_burn_fee: self.initial_burn_fee,
            initial_treasury: self.initial_treasury,
            initial_difficulty: self.initial_difficulty,
        }
    }
}
