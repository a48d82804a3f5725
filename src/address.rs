//! Hash-tree addressing.
//!
//! Every hash computed in the scheme is keyed by a 32-byte address so
//! that unrelated hashes never collide on the same input.  An address
//! is an ordered tuple of eight 32-bit words
//! `(layer, tree (2 words), type, ...type-specific..., key_and_mask)`
//! serialised big-endian.  The typed setters below ensure callers only
//! populate the slots that exist for the current address type.

use crate::utils::set_u32_at;

/// Address type for hashes within a WOTS+ chain.
pub(crate) const ADDR_TYPE_OTS: u32 = 0;
/// Address type for the L-tree compressing a WOTS+ public key.
pub(crate) const ADDR_TYPE_LTREE: u32 = 1;
/// Address type for nodes of a Merkle subtree.
pub(crate) const ADDR_TYPE_HASHTREE: u32 = 2;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub(crate) struct Address([u32; 8]);

impl Address {
    /// Specify which layer of the hypertree we are working in.
    pub fn set_layer(&mut self, layer: u32) {
        self.0[0] = layer;
    }

    /// Specify which tree within the layer we are working in.
    pub fn set_tree(&mut self, tree: u64) {
        self.0[1] = (tree >> 32) as u32;
        self.0[2] = tree as u32;
    }

    /// Specify what kind of hash this address keys.  One of the
    /// `ADDR_TYPE_*` constants; unrelated hash types must never share
    /// an address.
    pub fn set_type(&mut self, typ: u32) {
        self.0[3] = typ;
    }

    pub fn set_key_and_mask(&mut self, key_and_mask: u32) {
        self.0[7] = key_and_mask;
    }

    /// Copy the layer and tree slots (0..=2) from `other`.  Used when
    /// computing different hash types within the same subtree.
    pub fn set_subtree_from(&mut self, other: Address) {
        self.0[0] = other.0[0];
        self.0[1] = other.0[1];
        self.0[2] = other.0[2];
    }

    /// Specify which OTS keypair (leaf) we are talking about.
    pub fn set_ots(&mut self, ots: u32) {
        self.0[4] = ots;
    }

    /// Specify the WOTS+ chain within the OTS keypair.
    pub fn set_chain(&mut self, chain: u32) {
        self.0[5] = chain;
    }

    /// Specify the position within the WOTS+ chain.
    pub fn set_hash(&mut self, hash: u32) {
        self.0[6] = hash;
    }

    /// Specify which leaf the L-tree is compressing.
    pub fn set_ltree(&mut self, ltree: u32) {
        self.0[4] = ltree;
    }

    pub fn set_tree_height(&mut self, tree_height: u32) {
        self.0[5] = tree_height;
    }

    pub fn set_tree_index(&mut self, tree_index: u32) {
        self.0[6] = tree_index;
    }

    /// Canonical big-endian serialisation into a 32-byte buffer.
    pub fn write_into(&self, buf: &mut [u8]) {
        for (i, &w) in self.0.iter().enumerate() {
            set_u32_at(buf, w, i * 4);
        }
    }

    pub fn to_bytes(self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        self.write_into(&mut buf);
        buf
    }
}

#[cfg(test)]
impl From<[u32; 8]> for Address {
    fn from(words: [u32; 8]) -> Self {
        Address(words)
    }
}

/// Identifies one subtree within the hypertree: `layer` counts from the
/// bottom, `tree` indexes the subtrees of that layer left to right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubTreeAddress {
    pub layer: u32,
    pub tree: u64,
}

impl SubTreeAddress {
    /// The hash-tree address with the layer and tree slots populated.
    pub(crate) fn address(&self) -> Address {
        let mut addr = Address::default();
        addr.set_layer(self.layer);
        addr.set_tree(self.tree);
        addr
    }
}
