//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

use std::time::Duration;

use crate::types::ChainId;

/// Maximum number of proposals in a single Layer-1 [`crate::messages::BatchMsg`].
pub const MAX_BATCH_COUNT: usize = 100;

/// Delay after rotating onto the proposer role before acting on it, to allow
/// block data to settle. A protocol delay, not an implementation accident.
pub const SELF_ON_DUTY_DELAY: Duration = Duration::from_secs(1);

/// Per-nonce cap on the `beforeProposal` holding area. Oldest entry is dropped
/// on overflow to resist memory exhaustion from a flood of early peer messages.
pub const MAX_BEFORE_PROPOSAL_PER_NONCE: usize = 16;

/// The two process-wide chain ids, carried as an injected value rather than
/// globals (see spec design note on global mutable state).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub layer1_chain_id: ChainId,
    pub layer2_chain_id: ChainId,
}

impl Topology {
    pub fn new(layer1_chain_id: ChainId, layer2_chain_id: ChainId) -> Self {
        Self {
            layer1_chain_id,
            layer2_chain_id,
        }
    }

    pub fn is_layer1(&self, chain_id: ChainId) -> bool {
        chain_id == self.layer1_chain_id
    }

    pub fn is_layer2(&self, chain_id: ChainId) -> bool {
        chain_id == self.layer2_chain_id
    }
}

/// Per-chain-instance configuration for a [`crate::chain::ChainCoordinator`].
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    pub chain_id: ChainId,
    pub topology: Topology,
    pub bridge_contract_address: String,
    pub start_block: u64,
    pub max_batch_count: usize,
    pub self_on_duty_delay: Duration,
    pub before_proposal_cap: usize,
}

impl RelayerConfig {
    pub fn new(chain_id: ChainId, topology: Topology, bridge_contract_address: impl Into<String>) -> Self {
        Self {
            chain_id,
            topology,
            bridge_contract_address: bridge_contract_address.into(),
            start_block: 0,
            max_batch_count: MAX_BATCH_COUNT,
            self_on_duty_delay: SELF_ON_DUTY_DELAY,
            before_proposal_cap: MAX_BEFORE_PROPOSAL_PER_NONCE,
        }
    }

    pub fn is_layer1(&self) -> bool {
        self.topology.is_layer1(self.chain_id)
    }

    pub fn is_layer2(&self) -> bool {
        self.topology.is_layer2(self.chain_id)
    }
}
