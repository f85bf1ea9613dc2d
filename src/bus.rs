//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! An injected, per-instance event bus replacing the source's process-wide
//! `events.Subscribe`/`events.Notify` globals (spec design note on global
//! mutable state). Subscribers must be reentrant and must not block: long
//! work is offloaded, matching the source's `go func() { ... }` broadcast
//! handlers.

use tokio::sync::broadcast;

use crate::{messages::ProposalEvent, types::PublicKeyBytes};

/// The four named events the duty loop subscribes to, collapsed into one
/// closed enum (spec design note: reimplement the dynamic payload as a closed
/// tagged-variant with exhaustive dispatch).
#[derive(Debug, Clone)]
pub enum RelayerEvent {
    /// A `DepositProposalMsg | BatchMsg | FeedbackBatchMsg` arrived, from a peer
    /// or from our own redelivery of buffered `beforeProposal` messages.
    OnProposal(ProposalEvent),
    /// This node has rotated into the proposer role.
    SelfOnDuty,
    /// The Layer-2 super-voter public key changed.
    UpdateLayer2SuperVoter(PublicKeyBytes),
}

/// A process-wide-in-scope-but-injected broadcast bus. Cloning shares the
/// same channel; each chain instance holds its own `Bus`, so two chains never
/// cross-talk (the source's single global bus dispatched on chain id instead).
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<RelayerEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayerEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Silently drops it if there are no subscribers left,
    /// matching the fire-and-forget semantics of the source's `events.Notify`.
    pub fn publish(&self, event: RelayerEvent) {
        let _ignored = self.tx.send(event);
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DepositItem, DepositProposalMsg};
    use crate::types::{ChainId, ResourceId};

    fn sample_deposit_msg() -> DepositProposalMsg {
        DepositProposalMsg {
            item: DepositItem {
                source_chain_id: ChainId(1),
                dest_chain_id: ChainId(2),
                deposit_nonce: 1,
                resource_id: ResourceId([0u8; 32]),
                data: vec![],
            },
            proposer: PublicKeyBytes([1u8; 33]),
            signature: vec![0u8; 65],
        }
    }

    #[tokio::test]
    async fn subscribers_all_receive_published_events() {
        let bus = Bus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(RelayerEvent::OnProposal(ProposalEvent::Deposit(sample_deposit_msg())));

        assert!(matches!(a.recv().await.unwrap(), RelayerEvent::OnProposal(_)));
        assert!(matches!(b.recv().await.unwrap(), RelayerEvent::OnProposal(_)));
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = Bus::new(4);
        bus.publish(RelayerEvent::SelfOnDuty);
    }
}
