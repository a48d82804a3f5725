//! Private keys, public keys and signatures.
//!
//! The [`PrivateKey`] is the stateful heart of the scheme: it owns the
//! persistent container, issues each signature sequence number at most
//! once, resolves the cached subtrees a signature needs, and retires
//! sequence numbers so caches that can never be referenced again are
//! dropped.  `sign` may be called concurrently from multiple threads;
//! state transitions serialise through one mutex which is released for
//! CPU-bound subtree materialisation.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::address::{Address, SubTreeAddress, ADDR_TYPE_HASHTREE, ADDR_TYPE_LTREE, ADDR_TYPE_OTS};
use crate::container::{FsContainer, SubTreeSlot};
use crate::context::{Context, ScratchPad};
use crate::error::{Error, Result};
use crate::hash::PrecomputedHashes;
use crate::merkle::MerkleTree;
use crate::params::Params;
use crate::utils::{decode_u64, encode_u64_into};

/// An XMSS[MT] private key bound to its persistent container.
///
/// Dropping the key closes the container (best effort); call
/// [`PrivateKey::close`] to observe errors.
pub struct PrivateKey {
    inner: Arc<KeyInner>,
}

struct KeyInner {
    ctx: Context,
    pub_seed: Vec<u8>,
    sk_seed: Zeroizing<Vec<u8>>,
    sk_prf: Zeroizing<Vec<u8>>,
    root: Vec<u8>,
    ph: PrecomputedHashes,
    state: Mutex<KeyState>,
    /// Signalled whenever a subtree becomes ready (or its
    /// materialisation fails).
    subtree_ready: Condvar,
}

struct KeyState {
    ctr: FsContainer,
    /// First unused signature sequence number.
    seq_no: u64,
    /// Sequence numbers reserved from the container.  See
    /// [`PrivateKey::borrow_exactly`].
    borrowed: u32,
    /// The least sequence number that might still be in use by a
    /// `sign` operation.
    least_seq_no_in_use: u64,
    /// Retired sequence numbers above `least_seq_no_in_use`, kept on a
    /// min-heap until the frontier absorbs them.
    retired_seq_nos: BinaryHeap<Reverse<u64>>,
    subtrees: HashMap<SubTreeAddress, SubTreeStatus>,
    precompute_next: bool,
    workers: Vec<JoinHandle<()>>,
    closed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubTreeStatus {
    /// Some thread is materialising the subtree.
    InFlight,
    /// The subtree is allocated and filled.  `checked` records whether
    /// its integrity checksum has been verified this process lifetime.
    Ready { checked: bool },
}

/// An XMSS[MT] public key.
#[derive(Clone)]
pub struct PublicKey {
    ctx: Context,
    pub_seed: Vec<u8>,
    root: Vec<u8>,
    ph: PrecomputedHashes,
}

/// One layer of an XMSS[MT] signature: a WOTS+ signature and the
/// authentication path through that layer's subtree.
#[derive(Clone, PartialEq, Eq)]
pub struct SubTreeSig {
    wots_sig: Vec<u8>,
    auth_path: Vec<u8>,
}

/// An XMSS[MT] signature.
///
/// `sigs[0]` signs the message hash; `sigs[i]` for i > 0 signs the
/// root of the subtree below it.
#[derive(Clone)]
pub struct Signature {
    ctx: Context,
    seq_no: u64,
    /// Digest randomised value R.
    drv: Vec<u8>,
    sigs: Vec<SubTreeSig>,
}

impl Context {
    /// Generates a keypair from the system CSPRNG and stores it at the
    /// given path on the filesystem.  This creates `<path>`,
    /// `<path>.lock` and `<path>.cache`.
    ///
    /// NOTE do not forget to [`PrivateKey::close`] the private key.
    pub fn generate_key_pair(&self, path: impl AsRef<Path>) -> Result<(PrivateKey, PublicKey)> {
        let n = self.n();
        let mut pub_seed = vec![0u8; n];
        let mut sk_seed = Zeroizing::new(vec![0u8; n]);
        let mut sk_prf = Zeroizing::new(vec![0u8; n]);
        OsRng.fill_bytes(&mut pub_seed);
        OsRng.fill_bytes(&mut sk_seed);
        OsRng.fill_bytes(&mut sk_prf);
        self.derive(path, &pub_seed, &sk_seed, &sk_prf)
    }

    /// Derives a keypair from the given seeds and stores it at the
    /// given path on the filesystem.  The seeds must each be n bytes.
    ///
    /// NOTE do not forget to [`PrivateKey::close`] the private key.
    pub fn derive(
        &self,
        path: impl AsRef<Path>,
        pub_seed: &[u8],
        sk_seed: &[u8],
        sk_prf: &[u8],
    ) -> Result<(PrivateKey, PublicKey)> {
        let ctr = FsContainer::open(path.as_ref())?;
        self.derive_into(ctr, pub_seed, sk_seed, sk_prf)
    }

    fn derive_into(
        &self,
        mut ctr: FsContainer,
        pub_seed: &[u8],
        sk_seed: &[u8],
        sk_prf: &[u8],
    ) -> Result<(PrivateKey, PublicKey)> {
        let n = self.n();
        if pub_seed.len() != n || sk_seed.len() != n || sk_prf.len() != n {
            return Err(Error::InvalidParameters(format!(
                "skPrf, skSeed and pubSeed should have length {}",
                n
            )));
        }

        let mut concat = Zeroizing::new(vec![0u8; 3 * n]);
        concat[..n].copy_from_slice(sk_seed);
        concat[n..2 * n].copy_from_slice(sk_prf);
        concat[2 * n..].copy_from_slice(pub_seed);
        ctr.reset(&concat, self.p)?;

        let sk = new_private_key(self.clone(), pub_seed, sk_seed, sk_prf, 0, ctr)?;

        // Warm the cache for the first signatures.
        let mut pad = self.new_scratch_pad();
        sk.inner
            .get_subtree(&mut pad, SubTreeAddress { layer: 0, tree: 0 })?;

        let pk = sk.public_key();
        Ok((sk, pk))
    }
}

/// Loads the private key stored at the given path.
///
/// If the container wasn't properly closed, signatures may have been
/// lost; their number is returned as the third tuple element and those
/// sequence numbers are subtracted from future availability.
///
/// NOTE do not forget to [`PrivateKey::close`] the private key.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<(PrivateKey, PublicKey, u32)> {
    let mut ctr = FsContainer::open(path.as_ref())?;
    let Some(params) = ctr.initialized() else {
        return Err(Error::Serde("container is not initialized".into()));
    };
    if !ctr.cache_initialized() {
        info!("subtree cache is not initialized; rebuilding");
        ctr.reset_cache()?;
    }
    let ctx = Context::new(params)?;
    let (seq_no, lost_sigs) = ctr.seq_no();
    if lost_sigs > 0 {
        warn!(
            "{} signature(s) may have been lost by an unclean shutdown",
            lost_sigs
        );
    }

    let n = params.n as usize;
    let key = Zeroizing::new(ctr.private_key().to_vec());
    let sk = new_private_key(
        ctx,
        &key[2 * n..3 * n],
        &key[..n],
        &key[n..2 * n],
        seq_no,
        ctr,
    )?;
    let pk = sk.public_key();
    Ok((sk, pk, lost_sigs))
}

fn new_private_key(
    ctx: Context,
    pub_seed: &[u8],
    sk_seed: &[u8],
    sk_prf: &[u8],
    seq_no: u64,
    ctr: FsContainer,
) -> Result<PrivateKey> {
    let ph = ctx.precompute_hashes(pub_seed, Some(sk_seed));
    let subtrees = ctr
        .list_sub_trees()
        .into_iter()
        .map(|sta| (sta, SubTreeStatus::Ready { checked: false }))
        .collect();

    let root_sta = SubTreeAddress {
        layer: ctx.p.d - 1,
        tree: 0,
    };
    let mut inner = KeyInner {
        ctx,
        pub_seed: pub_seed.to_vec(),
        sk_seed: Zeroizing::new(sk_seed.to_vec()),
        sk_prf: Zeroizing::new(sk_prf.to_vec()),
        root: Vec::new(),
        ph,
        state: Mutex::new(KeyState {
            ctr,
            seq_no,
            borrowed: 0,
            least_seq_no_in_use: seq_no,
            retired_seq_nos: BinaryHeap::new(),
            subtrees,
            precompute_next: false,
            workers: Vec::new(),
            closed: false,
        }),
        subtree_ready: Condvar::new(),
    };

    let mut pad = inner.ctx.new_scratch_pad();
    let slot = inner.get_subtree(&mut pad, root_sta)?;
    let root = inner.tree_view(&slot).root().to_vec();
    inner.root = root;

    Ok(PrivateKey {
        inner: Arc::new(inner),
    })
}

impl KeyInner {
    fn tree_view<'a>(&self, slot: &'a SubTreeSlot) -> MerkleTree<&'a [u8]> {
        MerkleTree::from_buf(
            &slot.bytes()[..self.ctx.p.bare_subtree_size()],
            self.ctx.tree_height + 1,
            self.ctx.n(),
        )
    }

    fn slot_wots_sig<'a>(&self, slot: &'a SubTreeSlot) -> &'a [u8] {
        let bare = self.ctx.p.bare_subtree_size();
        &slot.bytes()[bare..bare + self.ctx.wots_sig_bytes as usize]
    }

    /// Returns the given subtree, either from the cache or by
    /// generating it.
    ///
    /// At most one materialisation of any subtree is ever in flight;
    /// a cached subtree is integrity-checked before its first use in
    /// this process lifetime, and a failed check triggers silent
    /// regeneration.
    fn get_subtree(&self, pad: &mut ScratchPad, sta: SubTreeAddress) -> Result<SubTreeSlot> {
        let mut st = self.state.lock().unwrap();
        loop {
            match st.subtrees.get(&sta).copied() {
                Some(SubTreeStatus::Ready { checked: true }) => {
                    let (slot, _) = st.ctr.get_sub_tree(sta)?;
                    return Ok(slot);
                }
                Some(SubTreeStatus::Ready { checked: false }) => {
                    let (slot, _) = st.ctr.get_sub_tree(sta)?;
                    if slot.verify_checksum() {
                        st.subtrees.insert(sta, SubTreeStatus::Ready { checked: true });
                        return Ok(slot);
                    }
                    warn!(
                        "cached subtree layer={} tree={} failed its integrity check; regenerating",
                        sta.layer, sta.tree
                    );
                    st.subtrees.insert(sta, SubTreeStatus::InFlight);
                    return self.materialise(st, pad, sta, slot);
                }
                Some(SubTreeStatus::InFlight) => {
                    st = self.subtree_ready.wait(st).unwrap();
                }
                None => {
                    let (slot, exists) = st.ctr.get_sub_tree(sta)?;
                    if exists {
                        // Allocated in an earlier lifetime; check it
                        // before first use.
                        st.subtrees
                            .insert(sta, SubTreeStatus::Ready { checked: false });
                        continue;
                    }
                    st.subtrees.insert(sta, SubTreeStatus::InFlight);
                    return self.materialise(st, pad, sta, slot);
                }
            }
        }
    }

    /// Fills `slot` outside the lock, publishes the result and wakes
    /// the waiters.  A failure clears the reservation so no ghost
    /// ready-flag survives.
    fn materialise(
        &self,
        st: MutexGuard<'_, KeyState>,
        pad: &mut ScratchPad,
        sta: SubTreeAddress,
        slot: SubTreeSlot,
    ) -> Result<SubTreeSlot> {
        drop(st);
        let result = self.build_subtree(pad, sta, slot);
        let mut st = self.state.lock().unwrap();
        match result {
            Ok(()) => {
                st.subtrees.insert(sta, SubTreeStatus::Ready { checked: true });
                drop(st);
                self.subtree_ready.notify_all();
                Ok(slot)
            }
            Err(err) => {
                st.subtrees.remove(&sta);
                drop(st);
                self.subtree_ready.notify_all();
                Err(err)
            }
        }
    }

    fn build_subtree(
        &self,
        pad: &mut ScratchPad,
        sta: SubTreeAddress,
        slot: SubTreeSlot,
    ) -> Result<()> {
        debug!("generating subtree layer={} tree={}", sta.layer, sta.tree);
        let ctx = &self.ctx;
        let bare = ctx.p.bare_subtree_size();
        // SAFETY: the subtree is marked in-flight, so this thread is
        // the only one touching the slot.
        let bytes = unsafe { slot.bytes_mut() };
        let (tree_buf, rest) = bytes.split_at_mut(bare);
        ctx.gen_subtree_into(&self.ph, sta, tree_buf);

        if sta.layer < ctx.p.d - 1 {
            // Store the WOTS+ signature of our root under the parent's
            // OTS key before the subtree is published.  This may
            // recursively materialise ancestors; the recursion
            // terminates at the root layer, which has no parent.
            let parent = SubTreeAddress {
                layer: sta.layer + 1,
                tree: sta.tree >> ctx.tree_height,
            };
            self.get_subtree(pad, parent)?;

            let mut ots_addr = parent.address();
            ots_addr.set_type(ADDR_TYPE_OTS);
            let leaf_idx = (sta.tree & ((1u64 << ctx.tree_height) - 1)) as u32;
            ots_addr.set_ots(leaf_idx);

            let tree = MerkleTree::from_buf(&tree_buf[..], ctx.tree_height + 1, ctx.n());
            let root = tree.root();
            let wots_sig = &mut rest[..ctx.wots_sig_bytes as usize];
            ctx.wots_sign_into(pad, root, &self.ph, ots_addr, wots_sig);
        }

        // SAFETY: still the only thread touching the slot.
        unsafe { slot.update_checksum() };
        Ok(())
    }

    fn sign_with_seq_no(&self, pad: &mut ScratchPad, seq_no: u64, msg: &[u8]) -> Result<Signature> {
        let ctx = &self.ctx;
        let (sta_path, leafs) = ctx.subtree_path_for_seq_no(seq_no);
        let d = sta_path.len();

        // Fetch (or generate) the subtrees, top layer first.
        let mut slots = Vec::with_capacity(d);
        for sta in sta_path.iter().rev() {
            slots.push(self.get_subtree(pad, *sta)?);
        }
        slots.reverse();

        let drv = ctx.prf_u64(seq_no, &self.sk_prf);
        let mut msg_hash = vec![0u8; ctx.n()];
        ctx.hash_message_into(msg, &drv, &self.root, seq_no, &mut msg_hash);

        // The part of the signature unique to this message.
        let mut sigs = Vec::with_capacity(d);
        let mut wots_sig = vec![0u8; ctx.wots_sig_bytes as usize];
        let mut ots_addr = sta_path[0].address();
        ots_addr.set_type(ADDR_TYPE_OTS);
        ots_addr.set_ots(leafs[0]);
        ctx.wots_sign_into(pad, &msg_hash, &self.ph, ots_addr, &mut wots_sig);
        sigs.push(SubTreeSig {
            wots_sig,
            auth_path: self.tree_view(&slots[0]).auth_path(leafs[0]),
        });

        // The tail is cached: each layer's WOTS+ signature was stored
        // when the subtree below it was generated.
        for i in 1..d {
            sigs.push(SubTreeSig {
                wots_sig: self.slot_wots_sig(&slots[i - 1]).to_vec(),
                auth_path: self.tree_view(&slots[i]).auth_path(leafs[i]),
            });
        }

        Ok(Signature {
            ctx: ctx.clone(),
            seq_no,
            drv,
            sigs,
        })
    }

    /// Declares `seq_no` no longer in use by any signing operation.
    /// Advancing the frontier may render cached subtrees permanently
    /// unreachable; those are dropped.
    fn retire_seq_no(&self, seq_no: u64) {
        let mut st = self.state.lock().unwrap();
        if seq_no != st.least_seq_no_in_use {
            st.retired_seq_nos.push(Reverse(seq_no));
            return;
        }
        let old_least = st.least_seq_no_in_use;
        st.least_seq_no_in_use += 1;
        while st.retired_seq_nos.peek() == Some(&Reverse(st.least_seq_no_in_use)) {
            st.retired_seq_nos.pop();
            st.least_seq_no_in_use += 1;
        }
        let new_least = st.least_seq_no_in_use;
        self.drop_unreachable_subtrees(&mut st, old_least, new_least);
    }

    /// Drops every cached subtree whose span now lies strictly below
    /// the least sequence number in use.
    fn drop_unreachable_subtrees(&self, st: &mut KeyState, old_least: u64, new_least: u64) {
        for layer in 0..self.ctx.p.d {
            let span = self.ctx.tree_height * (layer + 1);
            for tree in (old_least >> span)..(new_least >> span) {
                let sta = SubTreeAddress { layer, tree };
                st.subtrees.remove(&sta);
                if let Err(err) = st.ctr.drop_sub_tree(sta) {
                    warn!(
                        "failed to drop stale subtree layer={} tree={}: {}",
                        layer, tree, err
                    );
                }
            }
        }
    }
}

impl PrivateKey {
    /// Gets the next free sequence number, persisting the new frontier
    /// unless sequence numbers were borrowed.
    fn get_seq_no(&self) -> Result<u64> {
        let inner = &self.inner;
        let mut st = inner.state.lock().unwrap();
        if st.closed {
            return Err(Error::Io(std::io::Error::other("private key is closed")));
        }
        if st.seq_no >= inner.ctx.p.max_signature_seq_no() {
            return Err(Error::Exhausted);
        }
        if st.borrowed > 0 {
            st.borrowed -= 1;
        } else {
            let next = st.seq_no + 1;
            st.ctr.set_seq_no(next)?;
        }
        st.seq_no += 1;
        let seq_no = st.seq_no - 1;

        // On a subtree boundary, precompute the next layer-0 subtree so
        // the slow path never lands on a signing request.
        if st.precompute_next && seq_no & ((1u64 << inner.ctx.tree_height) - 1) == 0 {
            let next_sta = SubTreeAddress {
                layer: 0,
                tree: (seq_no >> inner.ctx.tree_height) + 1,
            };
            self.spawn_precompute(&mut st, next_sta);
        }
        Ok(seq_no)
    }

    fn spawn_precompute(&self, st: &mut KeyState, sta: SubTreeAddress) {
        if st.subtrees.contains_key(&sta) {
            return;
        }
        debug!(
            "scheduling precomputation of subtree layer={} tree={}",
            sta.layer, sta.tree
        );
        let inner = Arc::clone(&self.inner);
        st.workers.push(std::thread::spawn(move || {
            let mut pad = inner.ctx.new_scratch_pad();
            if let Err(err) = inner.get_subtree(&mut pad, sta) {
                warn!("background subtree precomputation failed: {}", err);
            }
        }));
    }

    /// Signs the given message.
    ///
    /// May be called concurrently from multiple threads on the same
    /// key; every returned signature carries a unique sequence number.
    /// If signing fails after the sequence number was issued, that
    /// sequence number stays consumed.
    pub fn sign(&self, msg: &[u8]) -> Result<Signature> {
        let mut pad = self.inner.ctx.new_scratch_pad();
        let seq_no = self.get_seq_no()?;
        let result = self.inner.sign_with_seq_no(&mut pad, seq_no, msg);
        self.inner.retire_seq_no(seq_no);
        result
    }

    /// Ensures exactly `amount` sequence numbers are reserved on disk
    /// for use by [`PrivateKey::sign`].
    ///
    /// By default every `sign` fsyncs the advanced sequence number.
    /// Borrowing amortises that cost over `amount` signatures at the
    /// price of losing up to `amount` sequence numbers in a crash.
    pub fn borrow_exactly(&self, amount: u32) -> Result<()> {
        let mut st = self.inner.state.lock().unwrap();
        borrow_exactly_locked(&mut st, amount)
    }

    /// Atomically runs `borrow_exactly(amount)` if no more than
    /// `threshold` sequence numbers are currently borrowed.
    pub fn borrow_exactly_if_below(&self, amount: u32, threshold: u32) -> Result<()> {
        let mut st = self.inner.state.lock().unwrap();
        if st.borrowed <= threshold {
            borrow_exactly_locked(&mut st, amount)?;
        }
        Ok(())
    }

    /// The number of sequence numbers currently borrowed from the
    /// container.
    pub fn borrowed_seq_nos(&self) -> u32 {
        self.inner.state.lock().unwrap().borrowed
    }

    /// The sequence number that will be used next.
    pub fn seq_no(&self) -> u64 {
        self.inner.state.lock().unwrap().seq_no
    }

    /// The number of issued sequence numbers not yet retired by a
    /// finished `sign` operation.
    pub fn unretired_seq_nos(&self) -> u32 {
        let st = self.inner.state.lock().unwrap();
        (st.seq_no - st.least_seq_no_in_use - st.retired_seq_nos.len() as u64) as u32
    }

    /// The number of subtrees currently cached.
    pub fn cached_sub_trees(&self) -> usize {
        self.inner.state.lock().unwrap().subtrees.len()
    }

    /// You probably should not use this function.
    ///
    /// Sets the signature sequence number directly.  Using the same
    /// sequence number twice destroys the security of the scheme.
    pub fn dangerous_set_seq_no(&self, seq_no: u64) {
        let mut st = self.inner.state.lock().unwrap();
        st.seq_no = seq_no;
        // Some cached subtrees may never be dropped now; that is the
        // least of our worries.
        st.retired_seq_nos = BinaryHeap::new();
        st.least_seq_no_in_use = seq_no;
    }

    /// Enables background precomputation of the next layer-0 subtree.
    ///
    /// By default a subtree is computed when it is first needed, so one
    /// in every 2^tree_height signatures is slow.  With precomputation
    /// the next subtree is built on a separate thread as soon as the
    /// current one starts being consumed.
    pub fn enable_subtree_precomputation(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.precompute_next = true;
        let next_sta = SubTreeAddress {
            layer: 0,
            tree: (st.seq_no >> self.inner.ctx.tree_height) + 1,
        };
        self.spawn_precompute(&mut st, next_sta);
    }

    /// The public key of this private key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            ctx: self.inner.ctx.clone(),
            pub_seed: self.inner.pub_seed.clone(),
            root: self.inner.root.clone(),
            ph: self
                .inner
                .ctx
                .precompute_hashes(&self.inner.pub_seed, None),
        }
    }

    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Closes the underlying container: joins background
    /// precomputation, rewinds the persisted sequence number to the
    /// actually-used frontier if sequence numbers remain borrowed, and
    /// releases the file lock.
    pub fn close(&self) -> Result<()> {
        // Join workers first so nothing touches the cache while it is
        // unmapped.
        let workers = {
            let mut st = self.inner.state.lock().unwrap();
            std::mem::take(&mut st.workers)
        };
        self.inner.subtree_ready.notify_all();
        for worker in workers {
            let _ = worker.join();
        }

        let mut st = self.inner.state.lock().unwrap();
        if st.closed {
            return Ok(());
        }
        st.borrowed = 0;
        // Rewind the persisted sequence number to the actually-used
        // frontier.  This also clears a stale borrowed marker when
        // every borrowed sequence number was used, so a clean shutdown
        // never reads as a crash.
        let (_, disk_borrowed) = st.ctr.seq_no();
        if disk_borrowed > 0 {
            let seq_no = st.seq_no;
            st.ctr.set_seq_no(seq_no)?;
        }
        st.closed = true;
        st.ctr.close()
    }

    #[cfg(test)]
    fn cached_subtree_addresses(&self) -> Vec<SubTreeAddress> {
        self.inner.state.lock().unwrap().ctr.list_sub_trees()
    }

    /// Test-only stand-in for a killed process: releases the container
    /// without rewinding the persisted sequence number.
    #[cfg(test)]
    fn abandon(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.closed = true;
        let _ = st.ctr.close();
    }
}

fn borrow_exactly_locked(st: &mut KeyState, amount: u32) -> Result<()> {
    if st.borrowed == amount {
        return Ok(());
    }
    if st.borrowed > amount {
        let seq_no = st.seq_no + u64::from(amount);
        st.ctr.set_seq_no(seq_no)?;
        st.borrowed = amount;
        return Ok(());
    }
    st.ctr.borrow_seq_nos(amount - st.borrowed)?;
    st.borrowed = amount;
    Ok(())
}

impl Drop for PrivateKey {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close private key: {}", err);
        }
    }
}

impl PublicKey {
    /// Checks whether `sig` is a valid signature of this public key on
    /// `msg`.
    ///
    /// Returns `Ok(true)` on success and [`Error::InvalidSignature`]
    /// (with no further detail) on any mismatch; the final root
    /// comparison is constant-time.
    pub fn verify(&self, sig: &Signature, msg: &[u8]) -> Result<bool> {
        let ctx = &self.ctx;
        if sig.ctx.p != ctx.p || sig.sigs.len() != ctx.p.d as usize {
            return Err(Error::InvalidSignature);
        }
        let n = ctx.n();
        let mut pad = ctx.new_scratch_pad();
        let mut wots_pk = vec![0u8; ctx.wots_sig_bytes as usize];

        let mut cur = vec![0u8; n];
        let mut prev = vec![0u8; n];
        ctx.hash_message_into(msg, &sig.drv, &self.root, sig.seq_no, &mut cur);

        let (sta_path, leafs) = ctx.subtree_path_for_seq_no(sig.seq_no);
        for layer in 0..ctx.p.d as usize {
            let sta_addr = sta_path[layer].address();
            let mut ots_addr = Address::default();
            ots_addr.set_subtree_from(sta_addr);
            ots_addr.set_type(ADDR_TYPE_OTS);
            let mut ltree_addr = Address::default();
            ltree_addr.set_subtree_from(sta_addr);
            ltree_addr.set_type(ADDR_TYPE_LTREE);
            let mut node_addr = Address::default();
            node_addr.set_subtree_from(sta_addr);
            node_addr.set_type(ADDR_TYPE_HASHTREE);

            let st_sig = &sig.sigs[layer];
            let mut offset = leafs[layer];
            ots_addr.set_ots(offset);
            ltree_addr.set_ltree(offset);

            prev.copy_from_slice(&cur);
            ctx.wots_pk_from_sig_into(
                &mut pad,
                &st_sig.wots_sig,
                &prev,
                &self.ph,
                ots_addr,
                &mut wots_pk,
            );
            ctx.l_tree_into(&mut wots_pk, &self.ph, ltree_addr, &mut cur);

            // Use the authentication path to hash up the subtree.
            for height in 1..=ctx.tree_height {
                node_addr.set_tree_height(height - 1);
                node_addr.set_tree_index(offset >> 1);
                let sibling =
                    &st_sig.auth_path[(height as usize - 1) * n..height as usize * n];
                prev.copy_from_slice(&cur);
                let (left, right) = if offset & 1 == 0 {
                    (&prev[..], sibling)
                } else {
                    (sibling, &prev[..])
                };
                ctx.h_into(left, right, &self.ph, &mut node_addr, &mut cur);
                offset >>= 1;
            }
        }

        if bool::from(cur.ct_eq(&self.root)) {
            Ok(true)
        } else {
            Err(Error::InvalidSignature)
        }
    }

    /// Serialises the public key as
    /// `params_header(4) ‖ root(n) ‖ pubSeed(n)`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let n = self.ctx.n();
        let mut ret = vec![0u8; 4 + self.ctx.pk_bytes as usize];
        self.ctx.p.write_into(&mut ret[..4])?;
        ret[4..4 + n].copy_from_slice(&self.root);
        ret[4 + n..].copy_from_slice(&self.pub_seed);
        Ok(ret)
    }

    /// Parses a public key as serialised by [`PublicKey::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Result<PublicKey> {
        if buf.len() < 4 {
            return Err(Error::Serde("public key is too short".into()));
        }
        let params = Params::from_header(&buf[..4])?;
        let ctx = Context::new(params)?;
        let n = ctx.n();
        if buf.len() != 4 + 2 * n {
            return Err(Error::Serde(format!(
                "public key should be {} bytes long (instead of {})",
                4 + 2 * n,
                buf.len()
            )));
        }
        let root = buf[4..4 + n].to_vec();
        let pub_seed = buf[4 + n..].to_vec();
        let ph = ctx.precompute_hashes(&pub_seed, None);
        Ok(PublicKey {
            ctx,
            pub_seed,
            root,
            ph,
        })
    }

    /// Base64 encoding of [`PublicKey::to_bytes`].
    pub fn to_text(&self) -> Result<String> {
        Ok(BASE64.encode(self.to_bytes()?))
    }

    /// Parses a public key as encoded by [`PublicKey::to_text`].
    pub fn from_text(text: &str) -> Result<PublicKey> {
        let buf = BASE64
            .decode(text.trim())
            .map_err(|err| Error::Serde(format!("invalid base64: {}", err)))?;
        PublicKey::from_bytes(&buf)
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The root node of the hypertree.
    pub fn root(&self) -> &[u8] {
        &self.root
    }
}

impl Signature {
    /// The sequence number of this signature.
    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Serialises the signature as `params_header(4) ‖
    /// seqNo(index_bytes) ‖ R(n) ‖ [wots_sig ‖ auth_path] × d`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut ret = vec![0u8; 4 + self.ctx.sig_bytes as usize];
        self.write_into(&mut ret)?;
        Ok(ret)
    }

    /// Writes the signature into `buf` in the same layout as
    /// [`Signature::to_bytes`].
    pub fn write_into(&self, buf: &mut [u8]) -> Result<()> {
        let ctx = &self.ctx;
        let n = ctx.n();
        let index_bytes = ctx.index_bytes as usize;
        ctx.p.write_into(&mut buf[..4])?;
        encode_u64_into(self.seq_no, &mut buf[4..4 + index_bytes]);
        buf[4 + index_bytes..4 + index_bytes + n].copy_from_slice(&self.drv);
        let st_off = 4 + index_bytes + n;
        let st_len = ctx.wots_sig_bytes as usize + n * ctx.tree_height as usize;
        for (i, st_sig) in self.sigs.iter().enumerate() {
            let off = st_off + i * st_len;
            buf[off..off + st_sig.wots_sig.len()].copy_from_slice(&st_sig.wots_sig);
            buf[off + st_sig.wots_sig.len()..off + st_len].copy_from_slice(&st_sig.auth_path);
        }
        Ok(())
    }

    /// Parses a signature as serialised by [`Signature::to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Result<Signature> {
        if buf.len() < 4 {
            return Err(Error::Serde("signature is too short".into()));
        }
        let params = Params::from_header(&buf[..4])?;
        let ctx = Context::new(params)?;
        if buf.len() != 4 + ctx.sig_bytes as usize {
            return Err(Error::Serde(format!(
                "signature should be {} bytes long (instead of {})",
                4 + ctx.sig_bytes,
                buf.len()
            )));
        }
        let n = ctx.n();
        let index_bytes = ctx.index_bytes as usize;
        let seq_no = decode_u64(&buf[4..4 + index_bytes]);
        let drv = buf[4 + index_bytes..4 + index_bytes + n].to_vec();
        let st_off = 4 + index_bytes + n;
        let st_len = ctx.wots_sig_bytes as usize + n * ctx.tree_height as usize;
        let sigs = (0..params.d as usize)
            .map(|i| {
                let off = st_off + i * st_len;
                SubTreeSig {
                    wots_sig: buf[off..off + ctx.wots_sig_bytes as usize].to_vec(),
                    auth_path: buf[off + ctx.wots_sig_bytes as usize..off + st_len].to_vec(),
                }
            })
            .collect();
        Ok(Signature {
            ctx,
            seq_no,
            drv,
            sigs,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} seqno={}/{}",
            self.ctx.p,
            self.seq_no,
            self.ctx.p.max_signature_seq_no()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{HashFunc, PrfConstruction};
    use sha2::{Digest, Sha256};
    use sha3::digest::{ExtendableOutput, Update, XofReader};
    use sha3::Shake128;
    use tempfile::TempDir;

    fn seq_seeds(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    /// SHAKE-128(10) of the signature bytes minus the 4-byte header.
    fn sig_body_digest(sig: &Signature) -> String {
        let bytes = sig.to_bytes().unwrap();
        let mut h = Shake128::default();
        h.update(&bytes[4..]);
        let mut out = [0u8; 10];
        h.finalize_xof().read(&mut out);
        hex::encode(out)
    }

    fn sig_body_sha256(sig: &Signature) -> String {
        let bytes = sig.to_bytes().unwrap();
        hex::encode(Sha256::digest(&bytes[4..]))
    }

    #[test]
    fn derive_sign_verify_xmssmt_60_12() {
        let dir = TempDir::new().unwrap();
        let msg = b"test message";
        let ctx = Context::from_name("XMSSMT-SHA2_60/12_256").unwrap();
        let pub_seed =
            hex::decode("5335890d5d174a65c2bb19eb301ae9c3201842c4d710a3f820fc735860646a51")
                .unwrap();
        let sk_seed =
            hex::decode("b9fcdb4826ceef80b10245650bdea01b5672f5695249b04a95abf2d33363d465")
                .unwrap();
        let sk_prf =
            hex::decode("f01cfb56df61b7e0a2f3d7fd6bc2b4f8426404f610192f06cce1b37ac9033d51")
                .unwrap();
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &pub_seed, &sk_seed, &sk_prf)
            .unwrap();
        assert_eq!(
            hex::encode(pk.root()),
            "ac655131aacd5dd041b093c7dcadd70269f8cdd6afddd4dbc52d1628f5087cb4"
        );

        let sig = sk.sign(msg).unwrap();
        assert_eq!(
            sig_body_sha256(&sig),
            "43d9769c0e51000137db4cb4c62cafd43b09dfec7f96a70636c959f020f28541"
        );
        assert!(pk.verify(&sig, msg).unwrap());
        assert!(matches!(
            pk.verify(&sig, b"wrong message"),
            Err(Error::InvalidSignature)
        ));

        sk.dangerous_set_seq_no(0x26ba0043f46012f);
        let sig = sk.sign(msg).unwrap();
        assert_eq!(sig.seq_no(), 0x26ba0043f46012f);
        assert_eq!(
            sig_body_sha256(&sig),
            "3477655201e7ec8d233e0169798cc00e294b19ff0419bf7a4ee28c526f2da6e5"
        );
        assert!(pk.verify(&sig, msg).unwrap());

        // Wire round-trips.
        let sig_bytes = sig.to_bytes().unwrap();
        let sig2 = Signature::from_bytes(&sig_bytes).unwrap();
        assert!(pk.verify(&sig2, msg).unwrap());
        assert_eq!(sig2.to_bytes().unwrap(), sig_bytes);

        let pk_bytes = pk.to_bytes().unwrap();
        let pk2 = PublicKey::from_bytes(&pk_bytes).unwrap();
        assert!(pk2.verify(&sig, msg).unwrap());

        sk.close().unwrap();
    }

    #[test]
    fn xmss_sha2_10_256_signature_vectors() {
        let dir = TempDir::new().unwrap();
        let msg = b"test message";
        let ctx = Context::from_name("XMSS-SHA2_10_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();

        let sig = sk.sign(msg).unwrap();
        assert_eq!(sig.seq_no(), 0);
        assert_eq!(sig_body_digest(&sig), "7de72d192121f414d4bb");
        assert!(pk.verify(&sig, msg).unwrap());

        sk.dangerous_set_seq_no(512);
        let sig = sk.sign(msg).unwrap();
        assert_eq!(sig.seq_no(), 512);
        assert_eq!(sig_body_digest(&sig), "8b6cb278d50a3694ca38");
        assert!(pk.verify(&sig, msg).unwrap());

        sk.close().unwrap();
    }

    #[test]
    fn xmssmt_sha2_20_2_signature_vectors() {
        let dir = TempDir::new().unwrap();
        let msg = b"test message";
        let ctx = Context::from_name("XMSSMT-SHA2_20/2_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();

        let sig = sk.sign(msg).unwrap();
        assert_eq!(sig_body_digest(&sig), "9df4c75282451bf2bc53");
        assert!(pk.verify(&sig, msg).unwrap());

        sk.dangerous_set_seq_no(1 << 19);
        let sig = sk.sign(msg).unwrap();
        assert_eq!(sig_body_digest(&sig), "fd4ff4c18801147b2804");
        assert!(pk.verify(&sig, msg).unwrap());

        sk.close().unwrap();
    }

    #[test]
    fn concurrent_signing_uses_each_seq_no_once() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        sk.borrow_exactly(4000).unwrap();

        let sigs = Mutex::new(Vec::with_capacity(4000));
        std::thread::scope(|scope| {
            for thread in 0..4 {
                let sk = &sk;
                let sigs = &sigs;
                scope.spawn(move || {
                    let msg = format!("message from thread {}", thread);
                    for _ in 0..1000 {
                        let sig = sk.sign(msg.as_bytes()).unwrap();
                        sigs.lock().unwrap().push((msg.clone(), sig));
                    }
                });
            }
        });

        let sigs = sigs.into_inner().unwrap();
        assert_eq!(sigs.len(), 4000);
        let mut seq_nos: Vec<u64> = sigs.iter().map(|(_, sig)| sig.seq_no()).collect();
        seq_nos.sort_unstable();
        assert_eq!(seq_nos, (0..4000).collect::<Vec<u64>>());
        for (msg, sig) in &sigs {
            assert!(pk.verify(sig, msg.as_bytes()).unwrap());
        }

        assert_eq!(sk.borrowed_seq_nos(), 0);
        assert_eq!(sk.unretired_seq_nos(), 0);
        sk.close().unwrap();

        // A clean shutdown leaves nothing to recover.
        let (sk2, _, lost_sigs) = load_private_key(dir.path().join("key")).unwrap();
        assert_eq!(lost_sigs, 0);
        assert_eq!(sk2.seq_no(), 4000);
        sk2.close().unwrap();
    }

    #[test]
    fn saved_key_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let msg = b"test message";
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let (sk, pk) = ctx.generate_key_pair(&path).unwrap();

        let sig = sk.sign(msg).unwrap();
        let used = sig.seq_no();
        assert!(pk.verify(&sig, msg).unwrap());
        sk.close().unwrap();

        let (sk2, pk2, lost_sigs) = load_private_key(&path).unwrap();
        assert_eq!(lost_sigs, 0);
        assert_eq!(sk2.seq_no(), used + 1);
        assert_eq!(
            pk2.to_bytes().unwrap(),
            pk.to_bytes().unwrap(),
            "public key was stored incorrectly"
        );

        let sig = sk2.sign(msg).unwrap();
        assert!(pk.verify(&sig, msg).unwrap());
        sk2.close().unwrap();
    }

    #[test]
    fn crash_recovery_surfaces_lost_sigs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx.derive(&path, &seeds, &seeds, &seeds).unwrap();

        sk.borrow_exactly(10).unwrap();
        for _ in 0..3 {
            sk.sign(b"hello").unwrap();
        }
        // The process dies without closing the key.
        sk.abandon();
        drop(sk);

        let (sk2, pk2, lost_sigs) = load_private_key(&path).unwrap();
        assert_eq!(lost_sigs, 10);
        // The recovered sequence number is the persisted frontier:
        // every borrowed sequence number counts as used.
        assert_eq!(sk2.seq_no(), 10);
        let sig = sk2.sign(b"after the crash").unwrap();
        assert_eq!(sig.seq_no(), 10);
        assert!(pk.verify(&sig, b"after the crash").unwrap());
        assert_eq!(pk2.to_bytes().unwrap(), pk.to_bytes().unwrap());
        sk2.close().unwrap();
    }

    #[test]
    fn corrupted_cache_is_regenerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx.derive(&path, &seeds, &seeds, &seeds).unwrap();
        sk.sign(b"first").unwrap();
        sk.close().unwrap();

        // Flip one byte in the body of the first cached record.
        let cache_path = dir.path().join("key.cache");
        let mut cache = std::fs::read(&cache_path).unwrap();
        cache[4096 + 13 + 50] ^= 0xff;
        std::fs::write(&cache_path, &cache).unwrap();

        let (sk2, pk2, _) = load_private_key(&path).unwrap();
        assert_eq!(
            pk2.to_bytes().unwrap(),
            pk.to_bytes().unwrap(),
            "regeneration should repair the corrupted subtree"
        );
        let sig = sk2.sign(b"second").unwrap();
        assert!(pk.verify(&sig, b"second").unwrap());
        sk2.close().unwrap();
    }

    #[test]
    fn sequence_numbers_exhaust() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::new(Params {
            func: HashFunc::Sha2,
            n: 16,
            full_height: 1,
            d: 1,
            wots_w: 16,
            prf: PrfConstruction::Rfc,
        })
        .unwrap();
        let seeds = seq_seeds(16);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        let sig = sk.sign(b"only one").unwrap();
        assert!(pk.verify(&sig, b"only one").unwrap());
        assert!(matches!(sk.sign(b"one too many"), Err(Error::Exhausted)));
        sk.close().unwrap();
    }

    #[test]
    fn tampering_never_verifies() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSS-SHA2_10_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        let msg = b"tamper with me".to_vec();
        let sig = sk.sign(&msg).unwrap();
        sk.close().unwrap();

        let sig_bytes = sig.to_bytes().unwrap();
        let pk_bytes = pk.to_bytes().unwrap();
        assert_eq!(crate::verify(&pk_bytes, &sig_bytes, &msg).ok(), Some(true));

        for i in 0..sig_bytes.len() {
            let mut tampered = sig_bytes.clone();
            tampered[i] ^= 1;
            assert_ne!(
                crate::verify(&pk_bytes, &tampered, &msg).ok(),
                Some(true),
                "flipping signature byte {} still verified",
                i
            );
        }
        for i in 0..msg.len() {
            let mut tampered = msg.clone();
            tampered[i] ^= 1;
            assert_ne!(
                crate::verify(&pk_bytes, &sig_bytes, &tampered).ok(),
                Some(true),
                "flipping message byte {} still verified",
                i
            );
        }
        for i in 0..pk_bytes.len() {
            let mut tampered = pk_bytes.clone();
            tampered[i] ^= 1;
            assert_ne!(
                crate::verify(&tampered, &sig_bytes, &msg).ok(),
                Some(true),
                "flipping public-key byte {} still verified",
                i
            );
        }
    }

    #[test]
    fn retiring_drops_stale_subtrees() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, _) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        sk.borrow_exactly(40).unwrap();

        let first = SubTreeAddress { layer: 0, tree: 0 };
        let second = SubTreeAddress { layer: 0, tree: 1 };
        assert!(sk.cached_subtree_addresses().contains(&first));

        // Signing through the whole first subtree retires every leaf
        // below it, which makes its cache unreachable.
        for _ in 0..33 {
            sk.sign(b"march on").unwrap();
        }
        let cached = sk.cached_subtree_addresses();
        assert!(!cached.contains(&first), "stale subtree was not dropped");
        assert!(cached.contains(&second));
        sk.close().unwrap();
    }

    #[test]
    fn precomputation_builds_the_next_subtree() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, _) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();

        let next = SubTreeAddress { layer: 0, tree: 1 };
        assert!(!sk.cached_subtree_addresses().contains(&next));
        sk.enable_subtree_precomputation();
        for _ in 0..100 {
            if sk.cached_subtree_addresses().contains(&next) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        assert!(
            sk.cached_subtree_addresses().contains(&next),
            "next subtree was not precomputed"
        );
        sk.close().unwrap();
    }

    #[test]
    fn public_key_text_round_trip() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSSMT-SHA2_60/12_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        let text = pk.to_text().unwrap();
        let pk2 = PublicKey::from_text(&text).unwrap();
        assert_eq!(pk2.to_bytes().unwrap(), pk.to_bytes().unwrap());
        assert!(PublicKey::from_text("not base64 at all!").is_err());
        sk.close().unwrap();
    }

    #[test]
    fn signature_wire_layout() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, pk) = ctx
            .derive(dir.path().join("key"), &seeds, &seeds, &seeds)
            .unwrap();
        let sig = sk.sign(b"layout").unwrap();
        sk.close().unwrap();

        let params = ctx.params();
        let bytes = sig.to_bytes().unwrap();
        // 4 + index_bytes + n + d·(len·n) + h·n
        let expected_len = 4
            + 3
            + 32
            + params.d as usize * params.wots_signature_size() as usize
            + params.full_height as usize * 32;
        assert_eq!(bytes.len(), expected_len);
        assert_eq!(&bytes[..4], &params.to_header().unwrap());
        assert_eq!(decode_u64(&bytes[4..7]), sig.seq_no());

        let parsed = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.seq_no(), sig.seq_no());
        assert!(pk.verify(&parsed, b"layout").unwrap());

        // Truncated input is rejected, not sliced.
        assert!(Signature::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(Signature::from_bytes(&bytes[..3]).is_err());

        let pk_bytes = pk.to_bytes().unwrap();
        assert_eq!(pk_bytes.len(), 4 + 64);
        assert!(PublicKey::from_bytes(&pk_bytes[..20]).is_err());
    }

    #[test]
    fn second_process_is_locked_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key");
        let ctx = Context::from_name("XMSSMT-SHA2_20/4_256").unwrap();
        let seeds = seq_seeds(32);
        let (sk, _) = ctx.derive(&path, &seeds, &seeds, &seeds).unwrap();

        match load_private_key(&path) {
            Err(err) => assert!(err.locked()),
            Ok(_) => panic!("the container lock should be held"),
        }
        sk.close().unwrap();
    }
}
