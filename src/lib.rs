//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Cross-chain bridge relayer core.
//!
//! Coordinates arbiter nodes moving deposits between a Layer-1 and a Layer-2
//! chain under a threshold-signature scheme. A [`chain::ChainCoordinator`]
//! drives proposal lifecycle (ingest, sign, broadcast, collect, execute) for
//! exactly one chain, backed by a concurrent [`pool::MsgPool`] and an
//! [`aggregator::SignatureAggregator`], reacting to an injected
//! [`bus::Bus`] of [`bus::RelayerEvent`]s.

pub mod aggregator;
pub mod bus;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hooks;
pub mod messages;
pub mod pool;
pub mod traits;
pub mod types;

pub use aggregator::SignatureAggregator;
pub use bus::{Bus, RelayerEvent};
pub use chain::{ChainCoordinator, DutyLoop};
pub use config::{RelayerConfig, Topology};
pub use error::RelayerError;
pub use pool::MsgPool;
pub use types::{Address, ChainId, DepositItem, Fingerprint, Proposal, PublicKeyBytes, ResourceId};
