//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Wire messages exchanged between arbiter peers.

use serde::{Deserialize, Serialize};

use crate::types::{batch_hash, ChainId, DepositItem, Fingerprint, PublicKeyBytes};

/// A deposit an arbiter would like to write into its own chain's queue; the
/// boundary `ChainClient::handle_proposal` turns this into a [`crate::types::Proposal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub destination: ChainId,
    pub data: Vec<u8>,
}

/// A peer's signature over a single Layer-2 proposal. Signature is ECDSA over
/// `text_hash(fingerprint(item))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositProposalMsg {
    pub item: DepositItem,
    pub proposer: PublicKeyBytes,
    pub signature: Vec<u8>,
}

/// A Layer-1 batch of up to `MAX_BATCH_COUNT` proposals signed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMsg {
    pub items: Vec<DepositItem>,
    pub proposer: PublicKeyBytes,
    pub signature: Vec<u8>,
}

impl BatchMsg {
    pub fn batch_hash(&self) -> Fingerprint {
        batch_hash(&self.items)
    }
}

/// A peer's signature on a specific batch fingerprint, sent back to the batch
/// proposer. Signature is over `text_hash(batch_msg_hash)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackBatchMsg {
    pub batch_msg_hash: Fingerprint,
    pub signer: PublicKeyBytes,
    pub signature: Vec<u8>,
    pub proposer: PublicKeyBytes,
}

/// Closed tagged variant replacing the source's dynamically-typed event
/// payload; dispatch on this enum is exhaustive.
#[derive(Debug, Clone)]
pub enum ProposalEvent {
    Deposit(DepositProposalMsg),
    Batch(BatchMsg),
    Feedback(FeedbackBatchMsg),
}

/// An on-chain proposal-status observation fed by `ListenStatusEvents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalStatusEvent {
    pub source_chain: ChainId,
    pub deposit_nonce: u64,
    pub status: ProposalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Pending,
    Executed,
}
