//! Deterministic builders shared by the invariant suites.

use {
    ember_chain::{Blockchain, ChainConfig, MemoryBlockStore},
    ember_types::{
        crypto::{keypair_from_seed, public_key_bytes, Keypair},
        Block, Currency, Slip, SlipKind, Transaction, TransactionKind,
    },
    std::sync::Arc,
};

pub fn keypair(seed: u8) -> Keypair {
    keypair_from_seed(&[seed; 32]).unwrap()
}

pub fn fresh_chain() -> Blockchain {
    Blockchain::new(ChainConfig::default(), Arc::new(MemoryBlockStore::new()))
}

/// A payment minting `amount` to the signer through an exempt sentinel
/// source; the way tests seed spendable value without a full issuance flow.
pub fn funding_tx(kp: &Keypair, amount: Currency, timestamp: u64) -> Transaction {
    let pk = public_key_bytes(kp);
    let mut tx = Transaction::new(TransactionKind::Normal, timestamp);
    tx.from.push(Slip::new_sentinel(pk, SlipKind::GoldenTicket));
    tx.to.push(Slip::new_output(pk, amount));
    tx.sign(kp);
    tx
}

/// A pending payment carrying exactly `fee` motes of fee.
pub fn fee_payment(kp: &Keypair, fee: Currency, timestamp: u64) -> Transaction {
    let pk = public_key_bytes(kp);
    let mut tx = Transaction::new(TransactionKind::Normal, timestamp);
    let mut input = Slip::new_output(pk, fee + 100);
    input.block_id = 1;
    input.tx_ordinal = 1;
    input.slip_index = timestamp % 64;
    tx.from.push(input);
    tx.to.push(Slip::new_output([0xAB; 32], 100));
    tx.sign(kp);
    tx
}

/// A payment spending a concrete earlier output, half onward as the fee.
pub fn spend_tx(kp: &Keypair, origin: &Slip, timestamp: u64) -> Transaction {
    let pk = public_key_bytes(kp);
    let mut tx = Transaction::new(TransactionKind::Normal, timestamp);
    tx.from.push(origin.clone());
    tx.to.push(Slip::new_output(pk, origin.amount / 2));
    tx.sign(kp);
    tx
}

/// A sealed genesis block carrying one funding transaction.
pub fn genesis(kp: &Keypair, funded: Currency) -> Block {
    let mut block = Block::new();
    block.id = 1;
    block.timestamp = 100_000;
    block.creator = public_key_bytes(kp);
    block.transactions.push(funding_tx(kp, funded, 100_000));
    block.seal(1);
    block
}

/// A sealed empty child of `prev` with the given burn fee.
pub fn child(prev: &Block, kp: &Keypair, burn_fee: Currency, timestamp_bump: u64) -> Block {
    let mut block = Block::new();
    block.id = prev.id + 1;
    block.prevhash = prev.hash;
    block.timestamp = prev.timestamp + timestamp_bump;
    block.creator = public_key_bytes(kp);
    block.burn_fee = burn_fee;
    block.seal(prev.max_tx_ordinal() + 1);
    block
}

/// A sealed child of `prev` carrying the given transactions.
pub fn child_with(
    prev: &Block,
    kp: &Keypair,
    burn_fee: Currency,
    timestamp_bump: u64,
    transactions: Vec<Transaction>,
) -> Block {
    let mut block = Block::new();
    block.id = prev.id + 1;
    block.prevhash = prev.hash;
    block.timestamp = prev.timestamp + timestamp_bump;
    block.creator = public_key_bytes(kp);
    block.burn_fee = burn_fee;
    block.transactions = transactions;
    block.seal(prev.max_tx_ordinal() + 1);
    block
}
