//! Merkle subtree construction: leaf generation, the L-tree compressing
//! WOTS+ public keys into leaves, and authentication paths.

use std::sync::Mutex;

use crate::address::{Address, SubTreeAddress, ADDR_TYPE_HASHTREE, ADDR_TYPE_LTREE, ADDR_TYPE_OTS};
use crate::context::{Context, ScratchPad};
use crate::hash::PrecomputedHashes;

/// Number of leaves a subtree worker pulls from the shared cursor at a
/// time.
const LEAF_BATCH: usize = 32;

/// A complete binary tree of `levels` levels over n-byte nodes, laid
/// out contiguously in a caller-provided buffer: level 0 (the leaves)
/// first, the root last.  Node (h, i) lives at offset
/// `(2^levels − 2^(levels−h) + i)·n`.
pub(crate) struct MerkleTree<B> {
    levels: u32,
    n: usize,
    buf: B,
}

impl<B: AsRef<[u8]>> MerkleTree<B> {
    pub fn from_buf(buf: B, levels: u32, n: usize) -> MerkleTree<B> {
        debug_assert_eq!(buf.as_ref().len(), ((1usize << levels) - 1) * n);
        MerkleTree { levels, n, buf }
    }

    fn node_offset(&self, height: u32, index: u64) -> usize {
        debug_assert!(height < self.levels);
        debug_assert!(index < 1u64 << (self.levels - 1 - height));
        ((1usize << self.levels) - (1usize << (self.levels - height))) * self.n
            + index as usize * self.n
    }

    pub fn node(&self, height: u32, index: u64) -> &[u8] {
        let off = self.node_offset(height, index);
        &self.buf.as_ref()[off..off + self.n]
    }

    /// The root node.
    pub fn root(&self) -> &[u8] {
        self.node(self.levels - 1, 0)
    }

    /// Writes the authentication path for `leaf` into `out`: for each
    /// level h below the root, the sibling `node(h, (leaf >> h) ^ 1)`.
    pub fn auth_path_into(&self, leaf: u32, out: &mut [u8]) {
        for height in 0..self.levels - 1 {
            let sibling = (u64::from(leaf) >> height) ^ 1;
            out[height as usize * self.n..(height as usize + 1) * self.n]
                .copy_from_slice(self.node(height, sibling));
        }
    }

    pub fn auth_path(&self, leaf: u32) -> Vec<u8> {
        let mut ret = vec![0u8; (self.levels as usize - 1) * self.n];
        self.auth_path_into(leaf, &mut ret);
        ret
    }
}

#[cfg(test)]
impl<B: AsRef<[u8]> + AsMut<[u8]>> MerkleTree<B> {
    pub fn node_mut(&mut self, height: u32, index: u64) -> &mut [u8] {
        let off = self.node_offset(height, index);
        &mut self.buf.as_mut()[off..off + self.n]
    }
}

impl Context {
    fn level_offset(&self, height: u32) -> usize {
        let levels = self.tree_height + 1;
        ((1usize << levels) - (1usize << (levels - height))) * self.n()
    }

    /// Generates the subtree at `sta` into `buf`, which must hold
    /// [`crate::params::Params::bare_subtree_size`] bytes.
    ///
    /// Leaves are produced by `threads` workers pulling small batches
    /// from a shared cursor; the tree above them is hashed up
    /// sequentially (its cost is negligible next to the leaves).
    pub(crate) fn gen_subtree_into(
        &self,
        ph: &PrecomputedHashes,
        sta: SubTreeAddress,
        buf: &mut [u8],
    ) {
        let n = self.n();
        let base = sta.address();
        let leaves = 1usize << self.tree_height;
        let threads = self.effective_threads();

        let (leaf_region, _) = buf.split_at_mut(leaves * n);
        if threads <= 1 || leaves <= LEAF_BATCH {
            let mut pad = self.new_scratch_pad();
            for (i, leaf) in leaf_region.chunks_mut(n).enumerate() {
                self.gen_leaf_at(&mut pad, ph, base, i as u32, leaf);
            }
        } else {
            let cursor = Mutex::new(leaf_region.chunks_mut(LEAF_BATCH * n).enumerate());
            std::thread::scope(|scope| {
                for _ in 0..threads {
                    scope.spawn(|| {
                        let mut pad = self.new_scratch_pad();
                        loop {
                            let batch = { cursor.lock().unwrap().next() };
                            let Some((batch_idx, chunk)) = batch else {
                                break;
                            };
                            for (k, leaf) in chunk.chunks_mut(n).enumerate() {
                                let leaf_idx = (batch_idx * LEAF_BATCH + k) as u32;
                                self.gen_leaf_at(&mut pad, ph, base, leaf_idx, leaf);
                            }
                        }
                    });
                }
            });
        }

        // Hash up the levels above the leaves.
        let mut addr = base;
        addr.set_type(ADDR_TYPE_HASHTREE);
        for height in 1..=self.tree_height {
            let (lower, upper) = buf.split_at_mut(self.level_offset(height));
            let prev = &lower[self.level_offset(height - 1)..];
            addr.set_tree_height(height - 1);
            for i in 0..1usize << (self.tree_height - height) {
                addr.set_tree_index(i as u32);
                self.h_into(
                    &prev[2 * i * n..(2 * i + 1) * n],
                    &prev[(2 * i + 1) * n..(2 * i + 2) * n],
                    ph,
                    &mut addr,
                    &mut upper[i * n..(i + 1) * n],
                );
            }
        }
    }

    fn gen_leaf_at(
        &self,
        pad: &mut ScratchPad,
        ph: &PrecomputedHashes,
        base: Address,
        leaf: u32,
        out: &mut [u8],
    ) {
        let mut ots_addr = base;
        ots_addr.set_type(ADDR_TYPE_OTS);
        ots_addr.set_ots(leaf);
        let mut ltree_addr = base;
        ltree_addr.set_type(ADDR_TYPE_LTREE);
        ltree_addr.set_ltree(leaf);
        self.gen_leaf_into(pad, ph, ltree_addr, ots_addr, out);
    }

    /// Generates the leaf for the WOTS+ keypair at `ots_addr` by
    /// computing its public key and compressing it with the L-tree.
    pub(crate) fn gen_leaf_into(
        &self,
        pad: &mut ScratchPad,
        ph: &PrecomputedHashes,
        ltree_addr: Address,
        ots_addr: Address,
        out: &mut [u8],
    ) {
        self.wots_pk_gen_into(ph, ots_addr, &mut pad.wots_pk);
        self.l_tree_into(&mut pad.wots_pk, ph, ltree_addr, out);
    }

    /// Compresses a WOTS+ public key into a single n-byte leaf by
    /// iteratively hashing adjacent pairs in place, promoting an odd
    /// trailing node one level up each round.  The public key buffer is
    /// destroyed.
    pub(crate) fn l_tree_into(
        &self,
        wots_pk: &mut [u8],
        ph: &PrecomputedHashes,
        ltree_addr: Address,
        out: &mut [u8],
    ) {
        let n = self.n();
        let mut addr = ltree_addr;
        let mut l = self.wots_len as usize;
        let mut height = 0u32;
        let mut parent = [0u8; 64];
        while l > 1 {
            addr.set_tree_height(height);
            for i in 0..l >> 1 {
                addr.set_tree_index(i as u32);
                self.h_into(
                    &wots_pk[2 * i * n..(2 * i + 1) * n],
                    &wots_pk[(2 * i + 1) * n..(2 * i + 2) * n],
                    ph,
                    &mut addr,
                    &mut parent[..n],
                );
                wots_pk[i * n..(i + 1) * n].copy_from_slice(&parent[..n]);
            }
            if l & 1 == 1 {
                wots_pk.copy_within((l - 1) * n..l * n, (l >> 1) * n);
                l = (l >> 1) + 1;
            } else {
                l >>= 1;
            }
            height += 1;
        }
        out.copy_from_slice(&wots_pk[..n]);
    }
}
