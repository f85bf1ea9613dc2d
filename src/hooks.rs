//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Observability extension points, mirroring the source's `ConsensusHooks`/
//! `OptionalHooks`/`NoopHooks` split: production wiring overrides only the
//! hooks it cares about, tests use [`NoopHooks`] unmodified.

use crate::{error::RelayerError, types::{ChainId, Fingerprint}};

pub trait RelayerHooks: Send + Sync {
    fn on_proposal_queued(&self, _chain_id: ChainId, _nonce: u64) {}

    fn on_signature_collected(&self, _fingerprint: Fingerprint, _verified_count: usize, _threshold: usize) {}

    fn on_proposal_promoted(&self, _chain_id: ChainId, _nonce: u64) {}

    fn on_proposal_executed(&self, _chain_id: ChainId, _nonce: u64) {}

    fn on_error(&self, _error: &RelayerError) {}
}

/// Default hooks implementation that does nothing; production binaries layer
/// metrics/tracing on top by implementing [`RelayerHooks`] directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl RelayerHooks for NoopHooks {}
