//   Copyright 2024 The Bridge Relayer Contributors
//   SPDX-License-Identifier: LGPL-3.0-only

//! Value objects shared by the pool, the aggregator and the chain coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::keccak256;

/// A chain identifier. Two process-wide values, `Layer1ChainID` and `Layer2ChainID`
/// in the source system, are carried here as an injected [`crate::config::Topology`]
/// rather than globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compressed 33-byte secp256k1 public key. Equality is byte-equality.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKeyBytes(#[serde(with = "serde_bytes_array33")] pub [u8; 33]);

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl PublicKeyBytes {
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

mod serde_bytes_array33 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 33], serializer: S) -> Result<S::Ok, S::Error> {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 33], D::Error> {
        let v = Vec::<u8>::deserialize(deserializer)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected exactly 33 bytes"))
    }
}

/// 20-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 32-byte opaque tag identifying the asset/route.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub [u8; 32]);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Deterministic digest identifying a [`Proposal`] or a batch of proposals.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// One deposit to be applied on the destination chain.
///
/// `Destination` must equal the owning [`crate::chain::ChainCoordinator`]'s chain id
/// for a proposal that chain may execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub source: ChainId,
    pub destination: ChainId,
    pub deposit_nonce: u64,
    pub resource_id: ResourceId,
    pub data: Vec<u8>,
}

impl Proposal {
    /// Deterministic digest over all fields. Used as the signing preimage on Layer-2
    /// and as the key into the pool's per-fingerprint signature sets.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut preimage = Vec::with_capacity(8 + 8 + 8 + 32 + self.data.len());
        preimage.extend_from_slice(&self.source.0.to_be_bytes());
        preimage.extend_from_slice(&self.destination.0.to_be_bytes());
        preimage.extend_from_slice(&self.deposit_nonce.to_be_bytes());
        preimage.extend_from_slice(&self.resource_id.0);
        preimage.extend_from_slice(&self.data);
        Fingerprint(keccak256(&preimage))
    }

    pub fn as_deposit_item(&self) -> DepositItem {
        DepositItem {
            source_chain_id: self.source,
            dest_chain_id: self.destination,
            deposit_nonce: self.deposit_nonce,
            resource_id: self.resource_id,
            data: self.data.clone(),
        }
    }
}

/// Wire form of a [`Proposal`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositItem {
    pub source_chain_id: ChainId,
    pub dest_chain_id: ChainId,
    pub deposit_nonce: u64,
    pub resource_id: ResourceId,
    pub data: Vec<u8>,
}

/// `compareMsg` from the source: two items match a proposal iff all five fields
/// are equal, byte-wise for `resource_id`/`data`. Symmetric over its field set.
pub fn compare_deposit_item(item: &DepositItem, proposal: &Proposal) -> bool {
    item.source_chain_id == proposal.source &&
        item.dest_chain_id == proposal.destination &&
        item.deposit_nonce == proposal.deposit_nonce &&
        item.resource_id == proposal.resource_id &&
        item.data == proposal.data
}

/// Deterministic digest over an ordered list of [`DepositItem`]s, used as a
/// [`crate::messages::BatchMsg`]'s fingerprint.
pub fn batch_hash(items: &[DepositItem]) -> Fingerprint {
    let mut preimage = Vec::new();
    for item in items {
        preimage.extend_from_slice(&item.source_chain_id.0.to_be_bytes());
        preimage.extend_from_slice(&item.dest_chain_id.0.to_be_bytes());
        preimage.extend_from_slice(&item.deposit_nonce.to_be_bytes());
        preimage.extend_from_slice(&item.resource_id.0);
        preimage.extend_from_slice(&item.data);
    }
    Fingerprint(keccak256(&preimage))
}
