//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! The per-chain coordinator: owns the pool, the aggregator, the bus and the
//! boundary trait objects for exactly one chain, and implements the wire
//! protocol operations (`Write`, `broadProposal`, `onDepositMsg`, ...).

mod duty_loop;

pub use duty_loop::DutyLoop;

use std::sync::Mutex;

use k256::ecdsa::SigningKey;
use log::{debug, info, warn};

use crate::{
    aggregator::SignatureAggregator,
    bus::{Bus, RelayerEvent},
    config::RelayerConfig,
    crypto::{self, text_hash},
    error::RelayerError,
    hooks::RelayerHooks,
    messages::{BatchMsg, DepositProposalMsg, FeedbackBatchMsg, ProposalEvent, ProposalStatusEvent, ProposalStatus},
    pool::MsgPool,
    traits::{ArbiterManager, ChainClient, EventListener, RelayerSpec},
    types::{ChainId, DepositItem, Fingerprint, Proposal, PublicKeyBytes},
};

const LOG_TARGET: &str = "bridge_relayer::chain";

/// The batch a Layer-1 coordinator currently has outstanding for feedback
/// collection (the source's `currentProposal`).
struct CurrentBatch {
    msg: BatchMsg,
}

/// Drives proposal lifecycle for exactly one chain. Generic over the boundary
/// traits so tests can substitute fakes for the chain client, event listener
/// and arbiter committee.
pub struct ChainCoordinator<S: RelayerSpec> {
    config: RelayerConfig,
    signing_key: SigningKey,
    pool: MsgPool,
    aggregator: SignatureAggregator,
    bus: Bus,
    chain_client: S::ChainClient,
    arbiters: S::ArbiterManager,
    hooks: S::Hooks,
    current_batch: Mutex<Option<CurrentBatch>>,
}

impl<S: RelayerSpec> ChainCoordinator<S> {
    pub fn new(
        config: RelayerConfig,
        signing_key: SigningKey,
        pool: MsgPool,
        bus: Bus,
        chain_client: S::ChainClient,
        arbiters: S::ArbiterManager,
        hooks: S::Hooks,
    ) -> Self {
        Self {
            config,
            signing_key,
            pool,
            aggregator: SignatureAggregator,
            bus,
            chain_client,
            arbiters,
            hooks,
            current_batch: Mutex::new(None),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    pub fn layer2_chain_id(&self) -> ChainId {
        self.config.topology.layer2_chain_id
    }

    pub fn self_on_duty_delay(&self) -> std::time::Duration {
        self.config.self_on_duty_delay
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn pool(&self) -> &MsgPool {
        &self.pool
    }

    pub fn hooks(&self) -> &S::Hooks {
        &self.hooks
    }

    fn threshold(&self) -> usize {
        SignatureAggregator::threshold(self.arbiters.total_count())
    }

    fn self_public_key(&self) -> PublicKeyBytes {
        self.arbiters.self_public_key()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Vec<u8> {
        crypto::sign_prehash(&self.signing_key, digest)
    }

    /// `isComplete`: asks the destination chain whether this deposit is
    /// already executed. A point-in-time observation; callers must not
    /// assume it stays valid past the call.
    async fn is_complete(&self, proposal: &Proposal) -> bool {
        self.chain_client.is_executed(proposal.deposit_nonce).await.unwrap_or(false)
    }

    /// `Write`: a local deposit enters the pipeline.
    pub async fn write(&self, destination: ChainId, data: Vec<u8>, deposit_nonce: u64, resource_id: crate::types::ResourceId) -> Result<(), RelayerError> {
        let proposal = Proposal { source: self.config.chain_id, destination, deposit_nonce, resource_id, data };
        if self.is_complete(&proposal).await {
            debug!(target: LOG_TARGET, "Write: nonce {} already executed, dropping", proposal.deposit_nonce);
            return Ok(());
        }
        let redelivered = self.pool.put_proposal(proposal.clone())?;
        self.hooks.on_proposal_queued(self.config.chain_id, proposal.deposit_nonce);
        for msg in redelivered {
            self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Deposit(msg)));
        }
        if self.config.topology.is_layer2(destination) {
            self.broad_proposal(&proposal).await?;
        }
        Ok(())
    }

    /// `broadProposal`: self-signs a Layer-2 proposal and broadcasts it,
    /// then redelivers any peer messages that arrived before we had it queued.
    pub async fn broad_proposal(&self, proposal: &Proposal) -> Result<(), RelayerError> {
        if self.is_complete(proposal).await {
            self.pool.on_proposal_executed(proposal.deposit_nonce);
            return Ok(());
        }

        let fp = proposal.fingerprint();
        let digest = text_hash(&fp.0);
        let signature = self.sign_digest(&digest);
        let own_signer = self.self_public_key();
        let nonce = proposal.deposit_nonce;
        let (_, promoted) =
            self.pool
                .on_proposal_verified_and_maybe_promote(fp, own_signer, signature.clone(), &[nonce], self.threshold());
        self.hooks.on_signature_collected(fp, self.pool.get_verified_count(fp), self.threshold());
        if promoted {
            // `PutExecuteProposal` only: actual submission waits for this node's
            // next `selfOnDuty` rotation to sweep `pending` via `execute_proposals`.
            self.hooks.on_proposal_promoted(self.config.chain_id, nonce);
        }

        self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Deposit(DepositProposalMsg {
            item: proposal.as_deposit_item(),
            proposer: own_signer,
            signature,
        })));

        for msg in self.pool.get_before_proposal(proposal.deposit_nonce) {
            self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Deposit(msg)));
        }
        Ok(())
    }

    /// `onDepositMsg`, Layer-2 only.
    pub async fn on_deposit_msg(&self, msg: DepositProposalMsg) -> Result<(), RelayerError> {
        let nonce = msg.item.deposit_nonce;
        let Some(proposal) = self.pool.get_queue_proposal(nonce) else {
            self.pool.put_before_proposal(msg);
            return Err(RelayerError::NotYetQueued { nonce });
        };

        if proposal.destination != self.config.chain_id {
            return Err(RelayerError::WrongDestination { destination: proposal.destination, chain_id: self.config.chain_id });
        }
        if self.pool.is_pending_proposal(nonce) {
            return Err(RelayerError::AlreadyExecuted { nonce });
        }
        if self.is_complete(&proposal).await {
            self.pool.on_proposal_executed(nonce);
            return Err(RelayerError::AlreadyExecuted { nonce });
        }
        let fp = proposal.fingerprint();
        if self.pool.arbiter_is_verified(fp, &msg.proposer) {
            return Err(RelayerError::DuplicateSigner { signer: msg.proposer.to_string(), fingerprint: fp });
        }

        let signer = self
            .aggregator
            .verify_deposit_msg(&msg.item, &msg.proposer, &msg.signature, &proposal, &self.arbiters)?;

        let (_, promoted) =
            self.pool
                .on_proposal_verified_and_maybe_promote(fp, signer, msg.signature, &[nonce], self.threshold());
        self.hooks.on_signature_collected(fp, self.pool.get_verified_count(fp), self.threshold());
        if promoted {
            // `PutExecuteProposal` only; see broad_proposal's comment above.
            self.hooks.on_proposal_promoted(self.config.chain_id, nonce);
        }
        Ok(())
    }

    /// Submits one pending proposal if it is still outstanding on-chain,
    /// pruning it instead if a status event beat us to it (S6).
    async fn execute_single(&self, proposal: &Proposal) -> Result<(), RelayerError> {
        let nonce = proposal.deposit_nonce;
        if self.is_complete(proposal).await {
            self.pool.on_proposal_executed(nonce);
            return Ok(());
        }
        let fp = proposal.fingerprint();
        let signatures = self.pool.get_signatures(fp);
        let Some(super_sig) = self.pool.get_super_voter_signer(fp) else {
            warn!(target: LOG_TARGET, "nonce {nonce} promoted without a super-voter signature; this is a pool invariant bug");
            return Ok(());
        };
        let item = proposal.as_deposit_item();
        let mut with_super = signatures;
        with_super.push((self.pool.super_voter(), super_sig));
        self.chain_client.submit_proposal(&item, &with_super).await?;
        self.pool.on_proposal_executed(nonce);
        self.hooks.on_proposal_executed(self.config.chain_id, nonce);
        Ok(())
    }

    /// `onBatchMsg`, Layer-1 only: verify a peer's proposed batch and sign
    /// our own feedback for it.
    pub async fn on_batch_msg(&self, msg: BatchMsg) -> Result<(), RelayerError> {
        if msg.items.is_empty() {
            return Err(RelayerError::EmptyBatch);
        }
        for item in &msg.items {
            let Some(proposal) = self.pool.get_queue_proposal(item.deposit_nonce) else {
                return Err(RelayerError::NotYetQueued { nonce: item.deposit_nonce });
            };
            if proposal.destination != self.config.chain_id {
                return Err(RelayerError::WrongDestination { destination: proposal.destination, chain_id: self.config.chain_id });
            }
            if self.is_complete(&proposal).await {
                self.pool.on_proposal_executed(item.deposit_nonce);
                return Err(RelayerError::AlreadyExecuted { nonce: item.deposit_nonce });
            }
            if !crate::types::compare_deposit_item(item, &proposal) {
                return Err(RelayerError::ItemMismatch { nonce: item.deposit_nonce });
            }
        }

        let batch_hash = msg.batch_hash();
        self.aggregator.verify_batch_msg(batch_hash, &msg.proposer, &msg.signature, &self.arbiters)?;

        let digest = text_hash(&batch_hash.0);
        let signature = self.sign_digest(&digest);
        self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Feedback(FeedbackBatchMsg {
            batch_msg_hash: batch_hash,
            signer: self.self_public_key(),
            signature,
            proposer: msg.proposer,
        })));
        Ok(())
    }

    /// `onFeedbackBatchMsg`, Layer-1 only.
    pub async fn on_feedback_batch_msg(&self, msg: FeedbackBatchMsg) -> Result<(), RelayerError> {
        let current_hash = {
            let guard = self.current_batch.lock().expect("current_batch mutex poisoned");
            guard.as_ref().map(|c| c.msg.batch_hash())
        };
        let Some(current_hash) = current_hash else {
            return Err(RelayerError::StaleBatch { current: Fingerprint([0u8; 32]), received: msg.batch_msg_hash });
        };

        if self.pool.arbiter_is_verified(current_hash, &msg.signer) {
            return Err(RelayerError::DuplicateSigner { signer: msg.signer.to_string(), fingerprint: current_hash });
        }

        let signer = self.aggregator.verify_feedback_msg(
            msg.batch_msg_hash,
            current_hash,
            &msg.signer,
            &msg.signature,
            &self.arbiters,
        )?;

        let nonces: Vec<u64> = {
            let guard = self.current_batch.lock().expect("current_batch mutex poisoned");
            guard.as_ref().map(|c| c.msg.items.iter().map(|i| i.deposit_nonce).collect()).unwrap_or_default()
        };
        let (_, promoted) = self.pool.on_proposal_verified_and_maybe_promote(
            current_hash,
            signer,
            msg.signature,
            &nonces,
            self.threshold(),
        );
        self.hooks.on_signature_collected(current_hash, self.pool.get_verified_count(current_hash), self.threshold());
        if promoted {
            self.execute_proposal_batch().await?;
        }
        Ok(())
    }

    /// `generateBatchProposal`, Layer-1: take up to `max_batch_count` queued
    /// proposals, sign them as a unit, broadcast, and feed back our own
    /// signature immediately.
    pub async fn generate_batch_proposal(&self) -> Result<(), RelayerError> {
        let snapshot = self.pool.get_queue_list();
        let mut queued = Vec::with_capacity(snapshot.len());
        for proposal in snapshot {
            if self.is_complete(&proposal).await {
                self.pool.on_proposal_executed(proposal.deposit_nonce);
            } else {
                queued.push(proposal);
            }
        }
        if queued.is_empty() {
            return Ok(());
        }
        queued.truncate(self.config.max_batch_count);

        let items: Vec<DepositItem> = queued.iter().map(Proposal::as_deposit_item).collect();
        let batch_hash = crate::types::batch_hash(&items);
        let digest = text_hash(&batch_hash.0);
        let signature = self.sign_digest(&digest);
        let proposer = self.self_public_key();

        let batch_msg = BatchMsg { items, proposer, signature: signature.clone() };
        *self.current_batch.lock().expect("current_batch mutex poisoned") = Some(CurrentBatch { msg: batch_msg.clone() });

        let (_, promoted) = self.pool.on_proposal_verified_and_maybe_promote(
            batch_hash,
            proposer,
            signature,
            &queued.iter().map(|p| p.deposit_nonce).collect::<Vec<_>>(),
            self.threshold(),
        );

        self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Batch(batch_msg.clone())));
        self.bus.publish(RelayerEvent::OnProposal(ProposalEvent::Feedback(FeedbackBatchMsg {
            batch_msg_hash: batch_hash,
            signer: proposer,
            signature: batch_msg.signature.clone(),
            proposer,
        })));

        if promoted {
            self.execute_proposal_batch().await?;
        }
        Ok(())
    }

    /// `ExecuteProposalBatch`: submit the outstanding batch with its
    /// collected signatures and super-voter signature.
    pub async fn execute_proposal_batch(&self) -> Result<(), RelayerError> {
        let batch = {
            let guard = self.current_batch.lock().expect("current_batch mutex poisoned");
            guard.as_ref().map(|c| c.msg.clone())
        };
        let Some(batch) = batch else {
            return Ok(());
        };
        let batch_hash = batch.batch_hash();
        let signatures = self.pool.get_signatures(batch_hash);
        let Some(super_sig) = self.pool.get_super_voter_signer(batch_hash) else {
            return Ok(());
        };
        let mut with_super = signatures;
        with_super.push((self.pool.super_voter(), super_sig));

        self.chain_client.submit_batch(&batch, &with_super).await?;
        for item in &batch.items {
            self.pool.on_proposal_executed(item.deposit_nonce);
            self.hooks.on_proposal_executed(self.config.chain_id, item.deposit_nonce);
        }
        *self.current_batch.lock().expect("current_batch mutex poisoned") = None;
        Ok(())
    }

    /// `ExecuteProposals`: the duty-gated sweep over `pending`, run only by
    /// the node currently on duty. Each proposal is re-checked against
    /// `isComplete` and submitted with its collected signatures exactly like
    /// [`Self::execute_single`]; a failure on one proposal does not stop the
    /// sweep from attempting the rest.
    pub async fn execute_proposals(&self, pending: &[Proposal]) -> Result<(), RelayerError> {
        for proposal in pending {
            if let Err(err) = self.execute_single(proposal).await {
                warn!(target: LOG_TARGET, "ExecuteProposals: nonce {} failed: {err}", proposal.deposit_nonce);
            }
        }
        Ok(())
    }

    /// `PollStatusEvent`: on an `Executed` observation for a proposal whose
    /// source is *not* this chain, prune it from the pool (S6).
    pub fn handle_status_event(&self, event: ProposalStatusEvent) {
        if event.status == ProposalStatus::Executed && event.source_chain != self.config.chain_id {
            self.pool.on_proposal_executed(event.deposit_nonce);
        }
    }

    /// `PollEvents`: fans a peer event stream into this chain's bus until the
    /// listener errors out (connection loss, subscription drop).
    pub async fn poll_events(&self, listener: &mut S::EventListener) -> Result<(), RelayerError> {
        loop {
            let event = listener.next_proposal_event().await.map_err(RelayerError::from)?;
            self.bus.publish(RelayerEvent::OnProposal(event));
        }
    }

    /// `PollStatusEvent`: fans on-chain status observations into
    /// [`Self::handle_status_event`] until the listener errors out.
    pub async fn poll_status_event(&self, listener: &mut S::EventListener) -> Result<(), RelayerError> {
        loop {
            let event = listener.next_status_event().await.map_err(RelayerError::from)?;
            self.handle_status_event(event);
        }
    }

    pub fn update_super_voter(&self, pk: PublicKeyBytes) {
        info!(target: LOG_TARGET, "updating layer-2 super voter to {pk}");
        self.pool.update_super_voter(pk);
    }

    // --- supplemented chain-management surface, grounded in the original
    // `evm.Chain`'s `WriteArbiters`/`GetArbiters`/`GetCurrentSuperSigner`/
    // `GetSuperSignerNodePublickey`/`GetBridgeContract` ---

    pub async fn write_arbiters(&self, arbiters: &[PublicKeyBytes]) -> Result<(), RelayerError> {
        self.chain_client.write_arbiters(arbiters).await.map_err(RelayerError::from)
    }

    pub async fn get_arbiters(&self) -> Result<Vec<PublicKeyBytes>, RelayerError> {
        self.chain_client.get_arbiters().await.map_err(RelayerError::from)
    }

    pub async fn get_current_super_signer(&self) -> Result<PublicKeyBytes, RelayerError> {
        self.chain_client.get_current_super_signer().await.map_err(RelayerError::from)
    }

    pub async fn get_super_signer_node_publickey(&self) -> Result<PublicKeyBytes, RelayerError> {
        self.chain_client.get_super_signer_node_publickey().await.map_err(RelayerError::from)
    }

    pub fn get_bridge_contract(&self) -> &str {
        self.chain_client.bridge_contract_address()
    }
}
