//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

use crate::{
    crypto::CryptoError,
    traits::{ChainClientError, EventListenerError},
    types::{ChainId, Fingerprint},
};

/// Error kinds produced while running the chain coordinator, the pool and the
/// signature aggregator. Signature/validation variants are never retried —
/// the offending message is dropped by the caller. [`RelayerError::ChainSubmitError`]
/// leaves the proposal in `pending` for the next duty cycle. [`RelayerError::SystemError`]
/// is pushed onto the supervisor's error channel.
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error("proposal for nonce {nonce} has not yet been queued")]
    NotYetQueued { nonce: u64 },

    #[error("nonce {nonce} already holds a conflicting proposal")]
    NonceCollision { nonce: u64 },

    #[error("message destination {destination} does not match this chain ({chain_id})")]
    WrongDestination { destination: ChainId, chain_id: ChainId },

    #[error("proposal for nonce {nonce} has already been executed on-chain")]
    AlreadyExecuted { nonce: u64 },

    #[error("signer {signer} has already been verified for fingerprint {fingerprint}")]
    DuplicateSigner { signer: String, fingerprint: Fingerprint },

    #[error("signature does not recover to the claimed signer {claimed}")]
    SignerMismatch { claimed: String },

    #[error("signer {signer} is neither a registered arbiter nor the super-voter")]
    UnknownArbiter { signer: String },

    #[error("feedback references batch {received} but the current batch is {current}")]
    StaleBatch { current: Fingerprint, received: Fingerprint },

    #[error("deposit item for nonce {nonce} does not match the locally queued proposal")]
    ItemMismatch { nonce: u64 },

    #[error("batch message carries no items")]
    EmptyBatch,

    #[error("proposal is self-submitted, refusing to sign back our own batch")]
    SelfSubmission,

    #[error("no queued proposal exists for nonce {nonce}")]
    ProposalNotFound { nonce: u64 },

    #[error("chain submission failed: {0}")]
    ChainSubmitError(#[from] ChainClientError),

    #[error("event listener failed: {0}")]
    EventListenerError(#[from] EventListenerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("system error: {0}")]
    SystemError(String),
}

impl RelayerError {
    /// Whether this error represents a peer-input validation failure that must
    /// never be retried (§7: the message is dropped, not re-delivered).
    pub fn is_non_retryable_validation(&self) -> bool {
        matches!(
            self,
            RelayerError::NonceCollision { .. } |
                RelayerError::WrongDestination { .. } |
                RelayerError::DuplicateSigner { .. } |
                RelayerError::SignerMismatch { .. } |
                RelayerError::UnknownArbiter { .. } |
                RelayerError::StaleBatch { .. } |
                RelayerError::ItemMismatch { .. } |
                RelayerError::EmptyBatch |
                RelayerError::SelfSubmission
        )
    }

    /// Whether this outcome is expected traffic rather than a fault: §7
    /// classifies `NotYetQueued` as buffered-not-an-error and `AlreadyExecuted`
    /// as a success outcome (the proposal is gone because it landed). Neither
    /// should be logged at `error!` level.
    pub fn is_benign(&self) -> bool {
        matches!(self, RelayerError::NotYetQueued { .. } | RelayerError::AlreadyExecuted { .. })
    }
}
