//! Treasury roll-forward, reward splits, and winner selection.

use {
    crate::solution::LotteryError,
    ember_types::{
        defs::PAYSPLIT_SCALE, Block, Currency, PublicKey, Slip, TicketSolution,
        TransactionKind,
    },
    log::trace,
};

/// Roll the monetary policy forward across one block.
///
/// The treasury absorbs whatever the previous block reclaimed from expired
/// outputs and pays out the coinbase it issued; the next coinbase is a flat
/// fraction of the resulting balance so issuance amortizes over one full
/// retention window.
pub fn calculate_monetary_policy(
    prev_block: &Block,
    genesis_period: u64,
) -> (Currency, Currency) {
    let treasury = prev_block
        .treasury
        .saturating_add(prev_block.reclaimed_funds)
        .saturating_sub(prev_block.coinbase);
    let coinbase = if genesis_period == 0 {
        0
    } else {
        treasury / genesis_period
    };
    (treasury, coinbase)
}

/// Split one block's revenue between the solver and the secondary recipient.
///
/// `miner = (fees + coinbase) * paysplit / PAYSPLIT_SCALE`, and the node
/// share is the remainder floored at zero. A paysplit above the scale
/// therefore silently awards the miner more than the revenue while the node
/// share clamps to zero; validation recomputes the same clamped values
/// rather than asserting conservation.
pub fn reward_split(
    fees: Currency,
    coinbase: Currency,
    paysplit: u64,
) -> (Currency, Currency) {
    let total = fees.saturating_add(coinbase);
    let miner = ((total as u128).saturating_mul(paysplit as u128)
        / PAYSPLIT_SCALE as u128)
        .min(u64::MAX as u128) as u64;
    let node = total.saturating_sub(miner);
    (miner, node)
}

/// Recompute the reward split for `prev_block` and compare it against the
/// shares a solution claims.
pub fn validate_monetary_policy(
    prev_block: &Block,
    solution: &TicketSolution,
    genesis_period: u64,
) -> Result<(), LotteryError> {
    let (_, coinbase) = calculate_monetary_policy(prev_block, genesis_period);
    let (expected_miner, expected_node) =
        reward_split(prev_block.total_fees(), coinbase, prev_block.paysplit);
    if solution.miner_share != expected_miner || solution.node_share != expected_node {
        return Err(LotteryError::ShareMismatch {
            embedded_miner: solution.miner_share,
            expected_miner,
            embedded_node: solution.node_share,
            expected_node,
        });
    }
    Ok(())
}

/// The addresses eligible to receive the secondary reward for a block:
/// the senders of its ordinary payments. Falls back to the block creator
/// when the block carried none.
pub fn reward_contenders(block: &Block) -> Vec<PublicKey> {
    let contenders: Vec<PublicKey> = block
        .transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Normal)
        .filter_map(|tx| tx.from.first().map(|s| s.address))
        .collect();
    if contenders.is_empty() {
        vec![block.creator]
    } else {
        contenders
    }
}

/// Index of the secondary winner among `n` contenders, derived from the last
/// `n` hex characters of the solution signature.
///
/// The value is reduced digit by digit so the result equals the full
/// hex-suffix integer modulo `n` without big-number arithmetic. Every node
/// recomputes the same index; nothing here is random.
pub fn winner_index(signature: &[u8; 64], n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let sig_hex = hex::encode(signature);
    let take = n.min(sig_hex.len());
    let mut value: u64 = 0;
    for c in sig_hex[sig_hex.len() - take..].chars() {
        let digit = c.to_digit(16).unwrap_or(0) as u64;
        value = (value * 16 + digit) % n as u64;
    }
    value as usize
}

/// Build the two payout slips for a validated solution: one to the solver,
/// one to the deterministically selected secondary recipient.
pub fn find_winners(prev_block: &Block, solution: &TicketSolution) -> [Slip; 2] {
    let contenders = reward_contenders(prev_block);
    let index = winner_index(&solution.signature, contenders.len());
    let winner = contenders[index];
    trace!(
        "secondary winner index {index} of {} for block {}",
        contenders.len(),
        prev_block.id
    );
    [
        Slip::new_output(solution.miner, solution.miner_share),
        Slip::new_output(winner, solution.node_share),
    ]
}
