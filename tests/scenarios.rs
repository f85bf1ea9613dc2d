//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! End-to-end scenarios against [`ChainCoordinator`] wired with fake boundary
//! implementations, mirroring the worked examples (N=4 arbiters, T=3,
//! super-voter = A4).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_relayer_core::{
    chain::ChainCoordinator,
    config::{RelayerConfig, Topology},
    crypto::{sign_prehash, text_hash},
    hooks::NoopHooks,
    messages::{BatchMsg, DepositProposalMsg, FeedbackBatchMsg},
    pool::MsgPool,
    traits::{ArbiterManager, ChainClient, ChainClientError, EventListener, EventListenerError, OffsetStore, RelayerSpec},
    Bus, ChainId, DepositItem, PublicKeyBytes, ResourceId,
};
use k256::ecdsa::SigningKey;
use rand_core::OsRng;

fn compressed(signing_key: &SigningKey) -> PublicKeyBytes {
    let encoded = signing_key.verifying_key().to_encoded_point(true);
    PublicKeyBytes(encoded.as_bytes().try_into().unwrap())
}

struct Arbiter {
    key: SigningKey,
    pk: PublicKeyBytes,
}

fn arbiter() -> Arbiter {
    let key = SigningKey::random(&mut OsRng);
    let pk = compressed(&key);
    Arbiter { key, pk }
}

fn sign_fingerprint(key: &SigningKey, preimage: &[u8; 32]) -> Vec<u8> {
    sign_prehash(key, &text_hash(preimage))
}

struct FakeArbiterManager {
    members: Vec<PublicKeyBytes>,
    // Shared with the harness so a test can simulate the committee view
    // refreshing in lockstep with `ChainCoordinator::update_super_voter`, as
    // it would once a real ArbiterManager re-reads on-chain committee state.
    super_voter: Arc<Mutex<PublicKeyBytes>>,
    me: PublicKeyBytes,
}

impl ArbiterManager for FakeArbiterManager {
    fn has_arbiter(&self, public_key: &PublicKeyBytes) -> bool {
        self.members.contains(public_key)
    }
    fn total_count(&self) -> usize {
        self.members.len()
    }
    fn super_voter(&self) -> PublicKeyBytes {
        self.super_voter.lock().unwrap().clone()
    }
    fn self_public_key(&self) -> PublicKeyBytes {
        self.me.clone()
    }
}

#[derive(Default, Clone)]
struct FakeChainClient {
    executed_nonces: Arc<Mutex<Vec<u64>>>,
    submit_proposal_calls: Arc<Mutex<usize>>,
    submit_batch_calls: Arc<Mutex<Vec<Vec<u64>>>>,
}

#[async_trait]
impl ChainClient for FakeChainClient {
    fn chain_id(&self) -> ChainId {
        ChainId(2)
    }

    async fn submit_proposal(&self, _item: &DepositItem, _signatures: &[(PublicKeyBytes, Vec<u8>)]) -> Result<(), ChainClientError> {
        *self.submit_proposal_calls.lock().unwrap() += 1;
        Ok(())
    }

    async fn submit_batch(&self, batch: &BatchMsg, _signatures: &[(PublicKeyBytes, Vec<u8>)]) -> Result<(), ChainClientError> {
        self.submit_batch_calls.lock().unwrap().push(batch.items.iter().map(|i| i.deposit_nonce).collect());
        Ok(())
    }

    async fn is_executed(&self, deposit_nonce: u64) -> Result<bool, ChainClientError> {
        Ok(self.executed_nonces.lock().unwrap().contains(&deposit_nonce))
    }

    async fn write_arbiters(&self, _arbiters: &[PublicKeyBytes]) -> Result<(), ChainClientError> {
        Ok(())
    }

    async fn get_arbiters(&self) -> Result<Vec<PublicKeyBytes>, ChainClientError> {
        Ok(vec![])
    }

    async fn get_current_super_signer(&self) -> Result<PublicKeyBytes, ChainClientError> {
        Ok(PublicKeyBytes([0u8; 33]))
    }

    async fn get_super_signer_node_publickey(&self) -> Result<PublicKeyBytes, ChainClientError> {
        Ok(PublicKeyBytes([0u8; 33]))
    }

    fn bridge_contract_address(&self) -> &str {
        "0xbridge"
    }
}

struct FakeEventListener;

#[async_trait]
impl EventListener for FakeEventListener {
    async fn next_proposal_event(&mut self) -> Result<bridge_relayer_core::messages::ProposalEvent, EventListenerError> {
        std::future::pending().await
    }
    async fn next_status_event(&mut self) -> Result<bridge_relayer_core::messages::ProposalStatusEvent, EventListenerError> {
        std::future::pending().await
    }
}

struct FakeOffsetStore;

impl OffsetStore for FakeOffsetStore {
    fn get_offset(&self, _chain_id: ChainId) -> Option<u64> {
        None
    }
    fn put_offset(&self, _chain_id: ChainId, _block: u64) {}
}

struct TestSpec;

impl RelayerSpec for TestSpec {
    type ChainClient = FakeChainClient;
    type EventListener = FakeEventListener;
    type ArbiterManager = FakeArbiterManager;
    type OffsetStore = FakeOffsetStore;
    type Hooks = NoopHooks;
}

fn layer2_config() -> RelayerConfig {
    RelayerConfig::new(ChainId(2), Topology::new(ChainId(1), ChainId(2)), "0xbridge")
}

fn layer1_config() -> RelayerConfig {
    RelayerConfig::new(ChainId(1), Topology::new(ChainId(1), ChainId(2)), "0xbridge")
}

struct Harness {
    coordinator: Arc<ChainCoordinator<TestSpec>>,
    arbiters: Vec<Arbiter>,
    super_voter: Arbiter,
    super_voter_handle: Arc<Mutex<PublicKeyBytes>>,
    chain_client: FakeChainClient,
}

/// This relayer node runs as A4, the designated super-voter, so its own
/// `broadProposal`/`generateBatchProposal` self-signature is the super-voter
/// contribution; A1,A2,A3 arrive over the wire as the three peer signatures
/// needed to reach `T = 3`.
fn build_harness(config: RelayerConfig) -> Harness {
    let a1 = arbiter();
    let a2 = arbiter();
    let a3 = arbiter();
    let a4 = arbiter(); // this node, and the super-voter
    let members = vec![a1.pk.clone(), a2.pk.clone(), a3.pk.clone(), a4.pk.clone()];

    let super_voter_handle = Arc::new(Mutex::new(a4.pk.clone()));
    let arbiters = FakeArbiterManager {
        members,
        super_voter: super_voter_handle.clone(),
        me: a4.pk.clone(),
    };
    let chain_client = FakeChainClient::default();
    let pool = MsgPool::new(a4.pk.clone(), 4);
    let bus = Bus::new(64);

    let super_voter_signing_key = a4.key.clone();
    let coordinator = Arc::new(ChainCoordinator::<TestSpec>::new(
        config,
        super_voter_signing_key,
        pool,
        bus,
        chain_client.clone(),
        arbiters,
        NoopHooks,
    ));

    Harness { coordinator, arbiters: vec![a1, a2, a3], super_voter: a4, super_voter_handle, chain_client }
}

fn deposit_msg(arbiter: &Arbiter, item: &DepositItem, fingerprint: &[u8; 32]) -> DepositProposalMsg {
    DepositProposalMsg {
        item: item.clone(),
        proposer: arbiter.pk.clone(),
        signature: sign_fingerprint(&arbiter.key, fingerprint),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s1_happy_path_layer2() {
    let h = build_harness(layer2_config());
    // `write` immediately self-signs as A4 (the super-voter), so the super
    // slot is filled from the start; only the three peer signatures remain.
    h.coordinator.write(ChainId(2), vec![1, 2, 3], 7, ResourceId([0u8; 32])).await.unwrap();

    let proposal = h.coordinator.pool().get_queue_proposal(7).expect("queued after Write");
    let fp = proposal.fingerprint().0;
    let item = proposal.as_deposit_item();

    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[0], &item, &fp)).await.unwrap();
    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[1], &item, &fp)).await.unwrap();
    assert!(h.coordinator.pool().get_queue_proposal(7).is_some(), "only 2 of 3 non-super sigs collected");

    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[2], &item, &fp)).await.unwrap();

    // Threshold+super reached: the proposal is moved to `pending`, but
    // submission waits for this node's own duty rotation, not this call.
    assert!(h.coordinator.pool().get_queue_proposal(7).is_none());
    assert!(h.coordinator.pool().is_pending_proposal(7));
    assert_eq!(*h.chain_client.submit_proposal_calls.lock().unwrap(), 0);

    let pending = h.coordinator.pool().get_pending_list();
    h.coordinator.execute_proposals(&pending).await.unwrap();

    assert!(!h.coordinator.pool().is_pending_proposal(7)); // executed and pruned
    assert_eq!(*h.chain_client.submit_proposal_calls.lock().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s2_out_of_order_message_is_buffered_then_redelivered() {
    let h = build_harness(layer2_config());
    let pending_proposal = bridge_relayer_core::types::Proposal {
        source: ChainId(1),
        destination: ChainId(2),
        deposit_nonce: 7,
        resource_id: ResourceId([0u8; 32]),
        data: vec![1, 2, 3],
    };
    let fp = pending_proposal.fingerprint().0;
    let item = pending_proposal.as_deposit_item();

    // A1's signature arrives before the local Write: buffered, not processed.
    let early = deposit_msg(&h.arbiters[0], &item, &fp);
    let result = h.coordinator.on_deposit_msg(early.clone()).await;
    assert!(matches!(result, Err(bridge_relayer_core::error::RelayerError::NotYetQueued { nonce: 7 })));

    let mut events = h.coordinator.bus().subscribe();
    h.coordinator.write(ChainId(2), vec![1, 2, 3], 7, ResourceId([0u8; 32])).await.unwrap();
    assert!(h.coordinator.pool().get_before_proposal(7).is_empty(), "drained on Write");

    // Drain the bus: the buffered A1 message plus our own self-signature were published.
    let mut redelivered = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let bridge_relayer_core::RelayerEvent::OnProposal(bridge_relayer_core::messages::ProposalEvent::Deposit(m)) = event {
            if m.proposer == h.arbiters[0].pk {
                redelivered.push(m);
            }
        }
    }
    assert_eq!(redelivered.len(), 1, "A1's early message was redelivered exactly once");
    for msg in redelivered {
        h.coordinator.on_deposit_msg(msg).await.unwrap();
    }

    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[1], &item, &fp)).await.unwrap();
    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[2], &item, &fp)).await.unwrap();
    assert!(h.coordinator.pool().get_queue_proposal(7).is_none(), "final state matches S1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s3_layer1_batch_executes_once() {
    let h = build_harness(layer1_config());
    for nonce in 1..=150u64 {
        h.coordinator
            .write(ChainId(2), vec![nonce as u8], nonce, ResourceId([0u8; 32]))
            .await
            .unwrap();
    }

    h.coordinator.generate_batch_proposal().await.unwrap();
    let items: Vec<_> = h.coordinator.pool().get_pending_list().into_iter().map(|p| p.deposit_nonce).collect();
    assert!(items.is_empty(), "nothing pending until threshold+super reached");

    let batch_hash = {
        let queued = h.coordinator.pool().get_queue_list();
        let items: Vec<DepositItem> = queued.iter().take(100).map(|p| p.as_deposit_item()).collect();
        bridge_relayer_core::types::batch_hash(&items)
    };

    // `generate_batch_proposal` already self-signed as A4, the super-voter;
    // the three peers below are the only signatures still needed to promote.
    for a in &h.arbiters {
        let sig = sign_fingerprint(&a.key, &batch_hash.0);
        h.coordinator
            .on_feedback_batch_msg(FeedbackBatchMsg { batch_msg_hash: batch_hash, signer: a.pk.clone(), signature: sig, proposer: a.pk.clone() })
            .await
            .unwrap();
    }

    let calls = h.coordinator.pool().get_queue_list().len();
    assert_eq!(calls, 50, "remaining 50 nonces stay queued for the next batch");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s4_super_voter_swap_blocks_execution_until_new_key_signs() {
    let h = build_harness(layer2_config());

    // The swap lands before our own Write, so our self-signature (still made
    // under the A4 identity) is classified against the *new* super key and
    // lands in the ordinary, non-super slot.
    let new_super = arbiter();
    h.coordinator.update_super_voter(new_super.pk.clone());
    // In production the committee view and the pool's classification key move
    // together, driven by the same on-chain event; simulate that here.
    *h.super_voter_handle.lock().unwrap() = new_super.pk.clone();

    h.coordinator.write(ChainId(2), vec![1], 5, ResourceId([0u8; 32])).await.unwrap();
    let proposal = h.coordinator.pool().get_queue_proposal(5).unwrap();
    let fp = proposal.fingerprint().0;
    let item = proposal.as_deposit_item();

    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[0], &item, &fp)).await.unwrap();
    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[1], &item, &fp)).await.unwrap();
    h.coordinator.on_deposit_msg(deposit_msg(&h.arbiters[2], &item, &fp)).await.unwrap();
    // Threshold of non-super signatures is met (self + three peers), but no
    // super-voter signature under the new key has arrived yet.
    assert!(h.coordinator.pool().get_queue_proposal(5).is_some());
    assert!(!h.coordinator.pool().is_pending_proposal(5));

    h.coordinator
        .on_deposit_msg(deposit_msg(&new_super, &item, &fp))
        .await
        .unwrap();
    assert!(h.coordinator.pool().get_queue_proposal(5).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s5_duplicate_signer_counts_once() {
    let h = build_harness(layer2_config());
    h.coordinator.write(ChainId(2), vec![1], 9, ResourceId([0u8; 32])).await.unwrap();
    let proposal = h.coordinator.pool().get_queue_proposal(9).unwrap();
    let fp_bytes = proposal.fingerprint().0;
    let item = proposal.as_deposit_item();

    let msg = deposit_msg(&h.arbiters[0], &item, &fp_bytes);
    h.coordinator.on_deposit_msg(msg.clone()).await.unwrap();
    let result = h.coordinator.on_deposit_msg(msg).await;
    assert!(result.is_err());
    assert_eq!(h.coordinator.pool().get_verified_count(proposal.fingerprint()), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn s6_already_executed_race_skips_pending_and_skips_execute() {
    let h = build_harness(layer2_config());
    h.coordinator.write(ChainId(2), vec![1], 3, ResourceId([0u8; 32])).await.unwrap();

    h.coordinator.handle_status_event(bridge_relayer_core::messages::ProposalStatusEvent {
        source_chain: ChainId(1), // a different chain reports it Executed first
        deposit_nonce: 3,
        status: bridge_relayer_core::messages::ProposalStatus::Executed,
    });

    assert!(h.coordinator.pool().get_queue_proposal(3).is_none());
    assert!(!h.coordinator.pool().is_pending_proposal(3));
    assert_eq!(*h.chain_client.submit_proposal_calls.lock().unwrap(), 0);
}
