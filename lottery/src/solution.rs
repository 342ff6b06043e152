//! Golden-ticket proof checking and solution construction.

use {
    ember_types::{
        crypto::{self, Keypair},
        defs::{DIFFICULTY_GATE_DIVISOR, DIFFICULTY_SCALE},
        Block, Hash32, TicketSolution, Transaction,
    },
    log::debug,
    thiserror::Error,
};

/// Why a candidate solution was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryError {
    #[error("transaction carries no solution payload")]
    MissingSolution,

    #[error("solution targets a different block than the one it would solve")]
    WrongTarget,

    #[error("solution hash does not satisfy the difficulty")]
    ProofFailed,

    #[error("solution signature does not verify against the miner key")]
    BadSignature,

    #[error(
        "embedded shares disagree with recomputed monetary policy: \
         miner {embedded_miner} vs {expected_miner}, node {embedded_node} vs {expected_node}"
    )]
    ShareMismatch {
        embedded_miner: u64,
        expected_miner: u64,
        embedded_node: u64,
        expected_node: u64,
    },
}

/// The puzzle hash a miner produces: SHA-256 over miner key and nonce.
pub fn solution_hash(miner: &[u8; 32], nonce: &Hash32) -> Hash32 {
    crypto::hashv(&[miner, nonce])
}

/// Check the two-stage difficulty gate.
///
/// The integer part of the difficulty demands that many trailing hex
/// characters of the candidate hash match the target; zero means the proof
/// passes trivially. The fractional part sets a floor on the hex digit just
/// before the matched suffix, tuning difficulty continuously between whole
/// characters.
pub fn proof_satisfies_difficulty(
    candidate: &Hash32,
    target: &Hash32,
    difficulty: u64,
) -> bool {
    let d_int = ((difficulty / DIFFICULTY_SCALE) as usize).min(64);
    if d_int == 0 {
        return true;
    }

    let candidate_hex = hex::encode(candidate);
    let target_hex = hex::encode(target);
    if candidate_hex[64 - d_int..] != target_hex[64 - d_int..] {
        return false;
    }

    let threshold = ((difficulty % DIFFICULTY_SCALE) / DIFFICULTY_GATE_DIVISOR) as u32;
    if threshold == 0 {
        return true;
    }
    let Some(gate_pos) = 64usize.checked_sub(d_int + 1) else {
        // The whole hash is suffix-matched; there is no gate digit left.
        return true;
    };
    let gate_digit = (candidate_hex.as_bytes()[gate_pos] as char)
        .to_digit(16)
        .unwrap_or(0);
    gate_digit >= threshold
}

/// Full validation of a golden-ticket transaction against the block it
/// claims to solve.
///
/// Order matters: the cheap structural checks run before signature
/// verification, and the monetary recomputation runs last.
pub fn validate_solution(
    prev_block: &Block,
    ticket_tx: &Transaction,
    genesis_period: u64,
) -> Result<(), LotteryError> {
    let solution = ticket_tx
        .solution
        .as_ref()
        .ok_or(LotteryError::MissingSolution)?;

    if solution.target != prev_block.hash {
        return Err(LotteryError::WrongTarget);
    }

    let candidate = solution_hash(&solution.miner, &solution.random_nonce);
    if !proof_satisfies_difficulty(&candidate, &prev_block.hash, prev_block.difficulty) {
        debug!(
            "ticket proof failed against block {} at difficulty {}",
            prev_block.id, prev_block.difficulty
        );
        return Err(LotteryError::ProofFailed);
    }

    if !crypto::verify(
        &solution.miner,
        &solution.signing_bytes(),
        &solution.signature,
    ) {
        return Err(LotteryError::BadSignature);
    }

    crate::monetary::validate_monetary_policy(prev_block, solution, genesis_period)
}

/// Package a solution for `prev_block` with the given nonce.
///
/// Shares are filled from the recomputed monetary policy so that the
/// solution validates on every node. Solvers vote the difficulty upward;
/// blocks drag it back down when no ticket arrives.
pub fn create_solution(
    prev_block: &Block,
    keypair: &Keypair,
    nonce: Hash32,
    genesis_period: u64,
) -> TicketSolution {
    let miner = crypto::public_key_bytes(keypair);
    let (_, coinbase) = crate::monetary::calculate_monetary_policy(prev_block, genesis_period);
    let (miner_share, node_share) =
        crate::monetary::reward_split(prev_block.total_fees(), coinbase, prev_block.paysplit);

    let mut solution = TicketSolution::new(prev_block.hash, miner, nonce);
    solution.difficulty_vote = 1;
    solution.miner_share = miner_share;
    solution.node_share = node_share;
    solution.signature = crypto::sign(keypair, &solution.signing_bytes());
    solution
}
