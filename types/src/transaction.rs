//! Signed transactions: payments, golden tickets, and fee capture.

use {
    crate::{
        crypto,
        defs::{
            Currency, SignatureBytes, Timestamp, TxOrdinal, EMPTY_SIGNATURE,
        },
        golden_ticket::TicketSolution,
        slip::Slip,
    },
    ed25519_dalek::Keypair,
    serde::{Deserialize, Serialize},
    serde_big_array::BigArray,
};

/// The consensus role of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// A wallet-created payment.
    Normal,
    /// Carries a lottery solution and pays out the block reward.
    GoldenTicket,
    /// Synthesized by the bundler; sweeps the fee surplus above the burn fee.
    FeeCapture,
}

/// A signed transfer of slips.
///
/// `from` lists the inputs being consumed, `to` the outputs being created.
/// The signature covers the timestamp, the full identity of every input, the
/// payload (owner, amount, kind) of every output, the message, the kind, the
/// paysplit vote, and the embedded solution if present. It does NOT cover
/// `ordinal` or the outputs' coordinates, which are assigned when the
/// containing block is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Global position along the chain. Assigned at sealing.
    pub ordinal: TxOrdinal,
    /// Creation time in ms.
    pub timestamp: Timestamp,
    /// Inputs being spent.
    pub from: Vec<Slip>,
    /// Outputs being created.
    pub to: Vec<Slip>,
    /// Free-form application payload.
    pub message: Vec<u8>,
    /// Consensus role.
    pub kind: TransactionKind,
    /// The creator's stance on how block revenue should split. A block only
    /// bundles transactions whose vote is neutral or matches its own.
    pub paysplit_vote: i8,
    /// Lottery solution, present iff `kind == GoldenTicket`.
    pub solution: Option<TicketSolution>,
    /// ed25519 signature by the address of `from[0]`.
    #[serde(with = "BigArray")]
    pub signature: SignatureBytes,
}

impl Transaction {
    pub fn new(kind: TransactionKind, timestamp: Timestamp) -> Self {
        Self {
            ordinal: 0,
            timestamp,
            from: Vec::new(),
            to: Vec::new(),
            message: Vec::new(),
            kind,
            paysplit_vote: 0,
            solution: None,
            signature: EMPTY_SIGNATURE,
        }
    }

    /// Sum of input values.
    pub fn total_in(&self) -> Currency {
        self.from.iter().fold(0u64, |acc, s| acc.saturating_add(s.amount))
    }

    /// Sum of output values.
    pub fn total_out(&self) -> Currency {
        self.to.iter().fold(0u64, |acc, s| acc.saturating_add(s.amount))
    }

    /// The fee this transaction pays: inputs minus outputs, floored at zero.
    /// Synthetic transactions (whose outputs exceed their zero-value sentinel
    /// inputs) therefore pay no fee.
    pub fn fee(&self) -> Currency {
        self.total_in().saturating_sub(self.total_out())
    }

    pub fn is_golden_ticket(&self) -> bool {
        self.kind == TransactionKind::GoldenTicket
    }

    pub fn is_fee_capture(&self) -> bool {
        self.kind == TransactionKind::FeeCapture
    }

    /// The canonical byte form the signature covers.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        for slip in &self.from {
            out.extend_from_slice(&slip.identity_bytes());
        }
        for slip in &self.to {
            out.extend_from_slice(&slip.payload_bytes());
        }
        out.extend_from_slice(&self.message);
        out.push(self.kind as u8);
        out.push(self.paysplit_vote as u8);
        if let Some(sol) = &self.solution {
            out.extend_from_slice(&sol.signing_bytes());
        }
        out
    }

    /// Sign with the keypair owning `from[0]`.
    pub fn sign(&mut self, keypair: &Keypair) {
        self.signature = crypto::sign(keypair, &self.signing_bytes());
    }

    /// Verify the signature against the address of the first input. A
    /// transaction with no inputs cannot be attributed and never verifies.
    pub fn verify_signature(&self) -> bool {
        let Some(signer) = self.from.first() else {
            return false;
        };
        crypto::verify(&signer.address, &self.signing_bytes(), &self.signature)
    }
}
