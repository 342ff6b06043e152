//! Scalar aliases and fixed-point scales shared across the workspace.
//!
//! Everything monetary is carried in **motes**, the indivisible base unit
//! (`1 EMBER = 100_000_000 motes`), as a `u64`. Ratios that the consensus
//! fields carry (paysplit, difficulty) are fixed-point integers so that every
//! node computes bit-identical values.

/// Height of a block along a single chain path. Monotonically increasing.
pub type BlockId = u64;

/// Global ordinal of a transaction along the longest chain.
pub type TxOrdinal = u64;

/// Index of an output slip within its transaction.
pub type SlipIndex = u64;

/// Monetary amount in motes.
pub type Currency = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// A 32-byte SHA-256 digest.
pub type Hash32 = [u8; 32];

/// A 32-byte ed25519 public key.
pub type PublicKey = [u8; 32];

/// A 64-byte ed25519 signature.
pub type SignatureBytes = [u8; 64];

/// The all-zero hash. A block whose `prevhash` equals this is a genesis
/// candidate and is admitted unconditionally as the longest chain.
pub const EMPTY_HASH: Hash32 = [0u8; 32];

/// The all-zero signature, used before a transaction is signed.
pub const EMPTY_SIGNATURE: SignatureBytes = [0u8; 64];

/// Motes per EMBER.
pub const MOTES_PER_EMBER: Currency = 100_000_000;

/// Fixed-point scale for the paysplit ratio. A paysplit of `PAYSPLIT_SCALE`
/// sends the entire block revenue to the lottery solver; `PAYSPLIT_SCALE / 2`
/// splits it evenly with the secondary recipient.
pub const PAYSPLIT_SCALE: u64 = 10_000;

/// Per-block paysplit movement when a block carries a non-zero vote.
pub const PAYSPLIT_VOTE_STEP: u64 = 1;

/// Fixed-point scale for mining difficulty. The integer part
/// (`difficulty / DIFFICULTY_SCALE`) is the number of trailing hex characters
/// a solution hash must share with the target; the fractional part drives the
/// secondary probabilistic gate.
pub const DIFFICULTY_SCALE: u64 = 10_000;

/// Per-block difficulty movement when a golden ticket carries a non-zero vote.
pub const DIFFICULTY_VOTE_STEP: u64 = 100;

/// Divisor mapping the fractional difficulty onto a single hex digit
/// threshold: `(difficulty % DIFFICULTY_SCALE) / DIFFICULTY_GATE_DIVISOR`
/// lands in `0..=15`.
pub const DIFFICULTY_GATE_DIVISOR: u64 = 625;

/// Render a hash (or any 32-byte id) as lowercase hex for logs.
pub fn hex_id(bytes: &Hash32) -> String {
    hex::encode(bytes)
}

/// Short 8-char prefix of a hash, for log lines where the full 64 chars
/// would drown the message.
pub fn short_id(bytes: &Hash32) -> String {
    hex::encode(&bytes[..4])
}
