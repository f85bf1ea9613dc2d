//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! The concurrent, two-stage proposal store. A single [`std::sync::Mutex`]
//! guards all pool state (the source's per-pool lock; see the design note on
//! per-fingerprint locking) — no `.await` is ever held across the critical
//! section, so synchronous `std::sync::Mutex` is the correct tool here, not
//! `tokio::sync::Mutex`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use crate::{
    error::RelayerError,
    messages::DepositProposalMsg,
    types::{Fingerprint, Proposal, PublicKeyBytes},
};

#[derive(Debug, Clone)]
struct SignatureEntry {
    signature: Vec<u8>,
    /// Decided once, at [`MsgPool::on_proposal_verified`] time, against
    /// whatever `super_voter_pk` held then. Never re-evaluated by
    /// [`MsgPool::update_super_voter`] (open question #2: resolved as
    /// "not intentional to re-evaluate" — see S4).
    is_super: bool,
}

/// An ordered multimap from signer to signature for one fingerprint, plus the
/// derived distinguished super-voter slot.
#[derive(Debug, Default, Clone)]
pub struct SignatureSet {
    entries: indexmap::IndexMap<PublicKeyBytes, SignatureEntry>,
}

impl SignatureSet {
    fn contains(&self, signer: &PublicKeyBytes) -> bool {
        self.entries.contains_key(signer)
    }

    /// Count of non-super-voter entries.
    pub fn verified_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_super).count()
    }

    /// Ordered `(signer, sig)` pairs excluding the super-voter slot, sorted by
    /// signer key bytes. This is the canonical, cross-node-stable order the
    /// on-chain verifier expects.
    pub fn signatures(&self) -> Vec<(PublicKeyBytes, Vec<u8>)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.is_super)
            .map(|(k, e)| (k.clone(), e.signature.clone()))
            .collect();
        out.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        out
    }

    pub fn super_voter_signature(&self) -> Option<Vec<u8>> {
        self.entries.values().find(|e| e.is_super).map(|e| e.signature.clone())
    }

    fn is_empty_of_signatures(&self) -> bool {
        self.entries.is_empty()
    }
}

struct PoolInner {
    queue: BTreeMap<u64, Proposal>,
    pending: BTreeMap<u64, Proposal>,
    sigs: HashMap<Fingerprint, SignatureSet>,
    before_proposal: HashMap<u64, VecDeque<DepositProposalMsg>>,
    super_voter_pk: PublicKeyBytes,
    before_proposal_cap: usize,
}

/// The message pool. Cheaply `Clone`-able (an `Arc` around the guarded state);
/// share one instance between the chain coordinator and the duty loop.
#[derive(Clone)]
pub struct MsgPool {
    inner: std::sync::Arc<Mutex<PoolInner>>,
}

impl MsgPool {
    pub fn new(initial_super_voter: PublicKeyBytes, before_proposal_cap: usize) -> Self {
        Self {
            inner: std::sync::Arc::new(Mutex::new(PoolInner {
                queue: BTreeMap::new(),
                pending: BTreeMap::new(),
                sigs: HashMap::new(),
                before_proposal: HashMap::new(),
                super_voter_pk: initial_super_voter,
                before_proposal_cap,
            })),
        }
    }

    /// Inserts `proposal` into `queue`, keyed by its deposit nonce. Returns the
    /// buffered `beforeProposal` messages for this nonce (now drained) so the
    /// caller can redeliver them. Idempotent on an equal re-insert; a
    /// conflicting proposal at the same nonce is rejected.
    pub fn put_proposal(&self, proposal: Proposal) -> Result<Vec<DepositProposalMsg>, RelayerError> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let nonce = proposal.deposit_nonce;
        match inner.queue.get(&nonce) {
            Some(existing) if *existing == proposal => return Ok(Vec::new()),
            Some(_) => return Err(RelayerError::NonceCollision { nonce }),
            None => {}
        }
        inner.queue.insert(nonce, proposal);
        Ok(inner
            .before_proposal
            .remove(&nonce)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default())
    }

    pub fn get_queue_proposal(&self, nonce: u64) -> Option<Proposal> {
        self.inner.lock().expect("pool mutex poisoned").queue.get(&nonce).cloned()
    }

    /// Snapshot of queued proposals, ascending by nonce.
    pub fn get_queue_list(&self) -> Vec<Proposal> {
        self.inner.lock().expect("pool mutex poisoned").queue.values().cloned().collect()
    }

    /// Snapshot of pending proposals, ascending by nonce.
    pub fn get_pending_list(&self) -> Vec<Proposal> {
        self.inner.lock().expect("pool mutex poisoned").pending.values().cloned().collect()
    }

    /// Buffers a peer message whose nonce is not yet queued. Caps the buffer
    /// per nonce, dropping the oldest entry on overflow.
    pub fn put_before_proposal(&self, msg: DepositProposalMsg) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let cap = inner.before_proposal_cap;
        let nonce = msg.item.deposit_nonce;
        let bucket = inner.before_proposal.entry(nonce).or_default();
        if bucket.len() >= cap {
            bucket.pop_front();
        }
        bucket.push_back(msg);
    }

    /// Returns and removes buffered messages matching `nonce`.
    pub fn get_before_proposal(&self, nonce: u64) -> Vec<DepositProposalMsg> {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .before_proposal
            .remove(&nonce)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Records a verified signature. Returns whether it was classified as the
    /// super-voter signature. A signer already present is a no-op, returning
    /// that entry's original classification.
    pub fn on_proposal_verified(&self, fp: Fingerprint, signer: PublicKeyBytes, signature: Vec<u8>) -> bool {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        Self::record_signature(&mut inner, fp, signer, signature)
    }

    fn record_signature(inner: &mut PoolInner, fp: Fingerprint, signer: PublicKeyBytes, signature: Vec<u8>) -> bool {
        let is_super = signer == inner.super_voter_pk;
        let set = inner.sigs.entry(fp).or_default();
        if let Some(existing) = set.entries.get(&signer) {
            return existing.is_super;
        }
        set.entries.insert(signer, SignatureEntry { signature, is_super });
        is_super
    }

    pub fn arbiter_is_verified(&self, fp: Fingerprint, signer: &PublicKeyBytes) -> bool {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .sigs
            .get(&fp)
            .map(|s| s.contains(signer))
            .unwrap_or(false)
    }

    pub fn get_verified_count(&self, fp: Fingerprint) -> usize {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .sigs
            .get(&fp)
            .map(SignatureSet::verified_count)
            .unwrap_or(0)
    }

    pub fn get_signatures(&self, fp: Fingerprint) -> Vec<(PublicKeyBytes, Vec<u8>)> {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .sigs
            .get(&fp)
            .map(SignatureSet::signatures)
            .unwrap_or_default()
    }

    pub fn get_super_voter_signer(&self, fp: Fingerprint) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .sigs
            .get(&fp)
            .and_then(SignatureSet::super_voter_signature)
    }

    pub fn is_pending_proposal(&self, nonce: u64) -> bool {
        self.inner.lock().expect("pool mutex poisoned").pending.contains_key(&nonce)
    }

    /// Moves a single nonce from `queue` to `pending`. Idempotent.
    pub fn put_execute_proposal(&self, nonce: u64) -> Result<(), RelayerError> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        Self::promote_nonce(&mut inner, nonce)
    }

    fn promote_nonce(inner: &mut PoolInner, nonce: u64) -> Result<(), RelayerError> {
        if inner.pending.contains_key(&nonce) {
            return Ok(());
        }
        match inner.queue.remove(&nonce) {
            Some(proposal) => {
                inner.pending.insert(nonce, proposal);
                Ok(())
            }
            None => Err(RelayerError::ProposalNotFound { nonce }),
        }
    }

    /// Removes a proposal from both maps and drops its signature set.
    pub fn on_proposal_executed(&self, nonce: u64) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let proposal = inner.pending.remove(&nonce).or_else(|| inner.queue.remove(&nonce));
        if let Some(proposal) = proposal {
            let fp = proposal.fingerprint();
            inner.sigs.remove(&fp);
        }
    }

    /// Replaces the super-voter key. Does not reclassify already-collected
    /// signatures (see [`SignatureEntry::is_super`]).
    pub fn update_super_voter(&self, pk: PublicKeyBytes) {
        self.inner.lock().expect("pool mutex poisoned").super_voter_pk = pk;
    }

    pub fn super_voter(&self) -> PublicKeyBytes {
        self.inner.lock().expect("pool mutex poisoned").super_voter_pk.clone()
    }

    /// Records a verified signature and, in the same critical section, checks
    /// the threshold and promotes every nonce in `nonces` from `queue` to
    /// `pending` if it is met. This is the single atomic operation the
    /// ordering guarantees require: threshold evaluation and the
    /// queue→pending transition must observe one consistent snapshot.
    ///
    /// Returns `(is_super, promoted)`. `promoted` is `false` if the threshold
    /// was not met, or if nonces failed to promote because they were already
    /// executed or missing from `queue` (a race this function tolerates:
    /// see S6, where a status event can remove a proposal mid-collection).
    pub fn on_proposal_verified_and_maybe_promote(
        &self,
        fp: Fingerprint,
        signer: PublicKeyBytes,
        signature: Vec<u8>,
        nonces: &[u64],
        threshold: usize,
    ) -> (bool, bool) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let is_super = Self::record_signature(&mut inner, fp, signer, signature);

        let set = inner.sigs.get(&fp);
        let threshold_met = set.map(|s| s.verified_count() >= threshold).unwrap_or(false) &&
            set.map(|s| s.super_voter_signature().is_some()).unwrap_or(false);
        if !threshold_met {
            return (is_super, false);
        }

        let mut promoted_any = false;
        for &nonce in nonces {
            if Self::promote_nonce(&mut inner, nonce).is_ok() {
                promoted_any = true;
            }
        }
        (is_super, promoted_any)
    }

    #[cfg(test)]
    fn sig_set_is_empty(&self, fp: Fingerprint) -> bool {
        self.inner
            .lock()
            .expect("pool mutex poisoned")
            .sigs
            .get(&fp)
            .map(SignatureSet::is_empty_of_signatures)
            .unwrap_or(true)
    }
}
