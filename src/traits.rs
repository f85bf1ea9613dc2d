//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Boundary traits the chain coordinator is generic over: on-chain
//! submission/reads, event ingestion and the arbiter committee. Kept as
//! traits (rather than a concrete RPC client) so tests can swap in fakes,
//! matching the source's split between `chainbridge-core` interfaces and the
//! concrete `evm` implementation.

use async_trait::async_trait;

use crate::{
    messages::{BatchMsg, ProposalEvent, ProposalStatusEvent},
    types::{ChainId, PublicKeyBytes},
};

#[derive(Debug, thiserror::Error)]
pub enum ChainClientError {
    #[error("rpc call failed: {0}")]
    Rpc(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("nonce {0} is unknown to the bridge contract")]
    UnknownNonce(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum EventListenerError {
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),
    #[error("connection to chain node lost")]
    ConnectionLost,
}

/// Read/write access to a single chain's bridge contract. One implementation
/// per chain id; the coordinator never distinguishes Layer-1 from Layer-2
/// beyond asking [`crate::config::Topology`].
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    /// Submits a single deposit proposal transaction (`Write` in the source).
    async fn submit_proposal(&self, item: &crate::types::DepositItem, signatures: &[(PublicKeyBytes, Vec<u8>)])
        -> Result<(), ChainClientError>;

    /// Submits a batch of proposals as one transaction (`ExecuteProposalBatch`).
    async fn submit_batch(&self, batch: &BatchMsg, signatures: &[(PublicKeyBytes, Vec<u8>)]) -> Result<(), ChainClientError>;

    /// Whether `deposit_nonce` has already been executed on this chain
    /// (`isComplete` in the source). A point-in-time observation.
    async fn is_executed(&self, deposit_nonce: u64) -> Result<bool, ChainClientError>;

    async fn write_arbiters(&self, arbiters: &[PublicKeyBytes]) -> Result<(), ChainClientError>;

    async fn get_arbiters(&self) -> Result<Vec<PublicKeyBytes>, ChainClientError>;

    async fn get_current_super_signer(&self) -> Result<PublicKeyBytes, ChainClientError>;

    async fn get_super_signer_node_publickey(&self) -> Result<PublicKeyBytes, ChainClientError>;

    fn bridge_contract_address(&self) -> &str;
}

/// Live feed of peer messages and on-chain status observations. Implementations
/// typically wrap a libp2p gossip subscription plus an RPC log poller.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn next_proposal_event(&mut self) -> Result<ProposalEvent, EventListenerError>;

    async fn next_status_event(&mut self) -> Result<ProposalStatusEvent, EventListenerError>;
}

/// The current arbiter committee and super-voter, as known to this node.
/// Deliberately synchronous: callers already hold the latest committee
/// snapshot in memory and must not block the pool's critical sections on I/O.
pub trait ArbiterManager: Send + Sync {
    fn has_arbiter(&self, public_key: &PublicKeyBytes) -> bool;

    fn total_count(&self) -> usize;

    fn super_voter(&self) -> PublicKeyBytes;

    fn self_public_key(&self) -> PublicKeyBytes;
}

/// Durable last-processed-block offsets, keyed by chain id, so a restart does
/// not re-scan from genesis (the source's `PluginBase.db` offset table).
pub trait OffsetStore: Send + Sync {
    fn get_offset(&self, chain_id: ChainId) -> Option<u64>;

    fn put_offset(&self, chain_id: ChainId, block: u64);
}

/// Bundles the boundary traits a [`crate::chain::ChainCoordinator`] is generic
/// over, mirroring the source's `ConsensusSpec` associated-type pattern so call
/// sites name one type parameter instead of four.
pub trait RelayerSpec: Send + Sync + 'static {
    type ChainClient: ChainClient;
    type EventListener: EventListener;
    type ArbiterManager: ArbiterManager;
    type OffsetStore: OffsetStore;
    type Hooks: crate::hooks::RelayerHooks;
}
