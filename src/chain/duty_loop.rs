//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! The scheduler reacting to on-chain events, peer messages and duty
//! rotation. Reimplements the source's background-task fan-in as an explicit
//! `tokio::select!` loop over a broadcast subscription and a cancellation
//! token, rather than spawned goroutines notifying a global bus.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    bus::RelayerEvent,
    chain::ChainCoordinator,
    messages::ProposalEvent,
    traits::RelayerSpec,
};

/// Owns a [`ChainCoordinator`] and drives it in response to bus events. One
/// `DutyLoop` per chain instance.
pub struct DutyLoop<S: RelayerSpec> {
    coordinator: Arc<ChainCoordinator<S>>,
    shutdown: CancellationToken,
}

impl<S: RelayerSpec> DutyLoop<S> {
    pub fn new(coordinator: Arc<ChainCoordinator<S>>, shutdown: CancellationToken) -> Self {
        Self { coordinator, shutdown }
    }

    /// Runs until the shutdown token fires. Each event is handled inline;
    /// a validation failure is logged and dropped, never retried (§7).
    pub async fn run(self) {
        let mut events = self.coordinator.bus().subscribe();
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!(target: LOG_TARGET, "duty loop shutting down");
                    return;
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => self.dispatch(event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(target: LOG_TARGET, "duty loop lagged, skipped {skipped} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            info!(target: LOG_TARGET, "event bus closed, stopping duty loop");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, event: RelayerEvent) {
        match event {
            RelayerEvent::OnProposal(ProposalEvent::Deposit(msg)) => {
                if let Err(err) = self.coordinator.on_deposit_msg(msg).await {
                    self.log_and_drop("onDepositMsg", &err);
                }
            }
            RelayerEvent::OnProposal(ProposalEvent::Batch(msg)) => {
                if let Err(err) = self.coordinator.on_batch_msg(msg).await {
                    self.log_and_drop("onBatchMsg", &err);
                }
            }
            RelayerEvent::OnProposal(ProposalEvent::Feedback(msg)) => {
                if let Err(err) = self.coordinator.on_feedback_batch_msg(msg).await {
                    self.log_and_drop("onFeedbackBatchMsg", &err);
                }
            }
            RelayerEvent::SelfOnDuty => {
                self.self_on_duty().await;
            }
            RelayerEvent::UpdateLayer2SuperVoter(pk) => {
                info!(target: LOG_TARGET, "super-voter updated to {pk}");
                self.coordinator.update_super_voter(pk);
            }
        }
    }

    fn log_and_drop(&self, op: &str, err: &crate::error::RelayerError) {
        if err.is_benign() {
            info!(target: LOG_TARGET, "{op}: {err}");
            return;
        }
        if err.is_non_retryable_validation() {
            warn!(target: LOG_TARGET, "{op} rejected: {err}");
        } else {
            error!(target: LOG_TARGET, "{op} failed: {err}");
        }
        self.coordinator.hooks().on_error(err);
    }

    /// `selfOnDuty`: a 1-second settle delay, then branch on topology. This
    /// delay is a protocol requirement, not an implementation accident.
    async fn self_on_duty(&self) {
        sleep(self.coordinator_self_on_duty_delay()).await;

        if self.coordinator.chain_id() == self.layer2_chain_id() {
            for proposal in self.coordinator.pool().get_queue_list() {
                if let Err(err) = self.coordinator.broad_proposal(&proposal).await {
                    self.log_and_drop("broadProposal", &err);
                }
            }
            let pending = self.coordinator.pool().get_pending_list();
            if let Err(err) = self.coordinator.execute_proposals(&pending).await {
                self.log_and_drop("ExecuteProposals", &err);
            }
        } else if let Err(err) = self.coordinator.generate_batch_proposal().await {
            self.log_and_drop("generateBatchProposal", &err);
        }
    }

    fn coordinator_self_on_duty_delay(&self) -> std::time::Duration {
        self.coordinator.self_on_duty_delay()
    }

    fn layer2_chain_id(&self) -> crate::types::ChainId {
        self.coordinator.layer2_chain_id()
    }
}

const LOG_TARGET: &str = "bridge_relayer::chain::duty_loop";
