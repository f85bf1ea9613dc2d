//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Signature verification and threshold arithmetic, kept free of pool/chain
//! state so it can be unit tested against bare key material.

use crate::{
    crypto::{recover_public_key, text_hash},
    error::RelayerError,
    traits::ArbiterManager,
    types::{compare_deposit_item, DepositItem, Fingerprint, Proposal, PublicKeyBytes},
};

/// Stateless verifier for the three wire message kinds. Holds no pool/chain
/// references; callers pass in whatever snapshot they already have.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureAggregator;

impl SignatureAggregator {
    /// `⌊2N/3⌋ + 1`, the non-super signature count required for execution.
    pub fn threshold(total_arbiters: usize) -> usize {
        (2 * total_arbiters) / 3 + 1
    }

    fn authorize(&self, arbiters: &dyn ArbiterManager, signer: &PublicKeyBytes) -> Result<(), RelayerError> {
        if arbiters.has_arbiter(signer) || *signer == arbiters.super_voter() {
            Ok(())
        } else {
            Err(RelayerError::UnknownArbiter { signer: signer.to_string() })
        }
    }

    /// Verifies a peer's signature on a single deposit proposal against the
    /// locally queued `proposal`. Returns the recovered, authorized signer.
    pub fn verify_deposit_msg(
        &self,
        item: &DepositItem,
        proposer: &PublicKeyBytes,
        signature: &[u8],
        proposal: &Proposal,
        arbiters: &dyn ArbiterManager,
    ) -> Result<PublicKeyBytes, RelayerError> {
        if !compare_deposit_item(item, proposal) {
            return Err(RelayerError::ItemMismatch { nonce: proposal.deposit_nonce });
        }
        let digest = text_hash(&proposal.fingerprint().0);
        let recovered = recover_public_key(&digest, signature)?;
        if recovered != *proposer {
            return Err(RelayerError::SignerMismatch { claimed: proposer.to_string() });
        }
        self.authorize(arbiters, &recovered)?;
        Ok(recovered)
    }

    /// Verifies a peer's `BatchMsg` signature. Rejects self-submission: a node
    /// must never accept its own batch back as though it were a peer's.
    pub fn verify_batch_msg(
        &self,
        batch_hash: Fingerprint,
        proposer: &PublicKeyBytes,
        signature: &[u8],
        arbiters: &dyn ArbiterManager,
    ) -> Result<PublicKeyBytes, RelayerError> {
        if *proposer == arbiters.self_public_key() {
            return Err(RelayerError::SelfSubmission);
        }
        let digest = text_hash(&batch_hash.0);
        let recovered = recover_public_key(&digest, signature)?;
        if recovered != *proposer {
            return Err(RelayerError::SignerMismatch { claimed: proposer.to_string() });
        }
        self.authorize(arbiters, &recovered)?;
        Ok(recovered)
    }

    /// Verifies a `FeedbackBatchMsg` against the batch we currently have
    /// outstanding. `current_batch_hash` must equal `m.batch_msg_hash`, else
    /// the feedback refers to a batch we have already moved past.
    pub fn verify_feedback_msg(
        &self,
        batch_msg_hash: Fingerprint,
        current_batch_hash: Fingerprint,
        signer: &PublicKeyBytes,
        signature: &[u8],
        arbiters: &dyn ArbiterManager,
    ) -> Result<PublicKeyBytes, RelayerError> {
        if batch_msg_hash != current_batch_hash {
            return Err(RelayerError::StaleBatch { current: current_batch_hash, received: batch_msg_hash });
        }
        let digest = text_hash(&current_batch_hash.0);
        let recovered = recover_public_key(&digest, signature)?;
        if recovered != *signer {
            return Err(RelayerError::SignerMismatch { claimed: signer.to_string() });
        }
        self.authorize(arbiters, &recovered)?;
        Ok(recovered)
    }
}
