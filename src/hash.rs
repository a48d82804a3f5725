//! The hashes used by WOTS+, XMSS and XMSS^MT.
//!
//! All hashes share the shape `H(padding ‖ key ‖ input)` where the
//! padding is a one-byte domain separator encoded into n bytes.  The
//! `padding ‖ key` prefix is long-lived: for the SHA-2 instances it is
//! absorbed into a digest state once per key and the state is cloned
//! for every PRF call.  The SHAKE rates are large enough that
//! precomputing the prefix has no merit, so those instances re-absorb
//! it each time.

use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::address::Address;
use crate::context::Context;
use crate::hash::fourway::ShakeX4;
use crate::params::{HashFunc, Params};
use crate::utils::{encode_u64_into, xor_into};

pub(crate) mod fourway;

pub(crate) const HASH_PADDING_F: u64 = 0;
pub(crate) const HASH_PADDING_H: u64 = 1;
pub(crate) const HASH_PADDING_HASH: u64 = 2;
pub(crate) const HASH_PADDING_PRF: u64 = 3;
pub(crate) const HASH_PADDING_PRF_KEYGEN: u64 = 4;

/// The concrete hash behind a parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HashBody {
    Sha256,
    Sha512,
    Shake128,
    Shake256,
}

impl HashBody {
    pub fn select(p: &Params) -> HashBody {
        match p.func {
            HashFunc::Sha2 => {
                if p.n <= 32 {
                    HashBody::Sha256
                } else {
                    HashBody::Sha512
                }
            }
            HashFunc::Shake => {
                if p.n <= 32 {
                    HashBody::Shake128
                } else {
                    HashBody::Shake256
                }
            }
            HashFunc::Shake256 => HashBody::Shake256,
        }
    }
}

fn shake128_parts(parts: &[&[u8]], out: &mut [u8]) {
    use sha3::digest::{ExtendableOutput, Update, XofReader};
    let mut h = sha3::Shake128::default();
    for part in parts {
        h.update(part);
    }
    h.finalize_xof().read(out);
}

fn shake256_parts(parts: &[&[u8]], out: &mut [u8]) {
    use sha3::digest::{ExtendableOutput, Update, XofReader};
    let mut h = sha3::Shake256::default();
    for part in parts {
        h.update(part);
    }
    h.finalize_xof().read(out);
}

/// A digest state with the long-lived `padding ‖ key` prefix already
/// absorbed, cloned for each PRF call.
#[derive(Clone)]
enum PrfState {
    Sha256(Sha256),
    Sha512(Sha512),
    /// SHAKE re-absorbs the prefix; nothing to precompute.
    Shake,
}

/// Precomputed hash prefixes for a keypair: the pubSeed variant and,
/// for private keys, the skSeed variant.  Logically immutable and
/// shared by reference between the private key and signing threads.
#[derive(Clone)]
pub(crate) struct PrecomputedHashes {
    pub(crate) pub_seed: Vec<u8>,
    sk_seed: Option<Zeroizing<Vec<u8>>>,
    prf_pub: PrfState,
    prf_sk: Option<PrfState>,
}

impl PrecomputedHashes {
    pub(crate) fn sk_seed(&self) -> &[u8] {
        match &self.sk_seed {
            Some(seed) => seed,
            None => panic!("precomputed hashes lack the secret seed"),
        }
    }
}

impl Context {
    /// Absorbs the PRF prefix for the given seeds.  `sk_seed` is `None`
    /// for verification-only use.
    pub(crate) fn precompute_hashes(
        &self,
        pub_seed: &[u8],
        sk_seed: Option<&[u8]>,
    ) -> PrecomputedHashes {
        let n = self.n();
        let absorb = |seed: &[u8]| -> PrfState {
            let mut pref = [0u8; 64];
            encode_u64_into(HASH_PADDING_PRF, &mut pref[..n]);
            match self.body {
                HashBody::Sha256 => {
                    let mut h = Sha256::new();
                    h.update(&pref[..n]);
                    h.update(seed);
                    PrfState::Sha256(h)
                }
                HashBody::Sha512 => {
                    let mut h = Sha512::new();
                    h.update(&pref[..n]);
                    h.update(seed);
                    PrfState::Sha512(h)
                }
                HashBody::Shake128 | HashBody::Shake256 => PrfState::Shake,
            }
        };
        PrecomputedHashes {
            pub_seed: pub_seed.to_vec(),
            sk_seed: sk_seed.map(|s| Zeroizing::new(s.to_vec())),
            prf_pub: absorb(pub_seed),
            prf_sk: sk_seed.map(absorb),
        }
    }

    /// Hashes the concatenation of `parts` into the n-byte `out`.
    pub(crate) fn hash_parts_into(&self, parts: &[&[u8]], out: &mut [u8]) {
        match self.body {
            HashBody::Sha256 => {
                let mut h = Sha256::new();
                for part in parts {
                    h.update(part);
                }
                let digest = h.finalize();
                out.copy_from_slice(&digest[..out.len()]);
            }
            HashBody::Sha512 => {
                let mut h = Sha512::new();
                for part in parts {
                    h.update(part);
                }
                let digest = h.finalize();
                out.copy_from_slice(&digest[..out.len()]);
            }
            HashBody::Shake128 => shake128_parts(parts, out),
            HashBody::Shake256 => shake256_parts(parts, out),
        }
    }

    /// Compute PRF(key, addr).
    pub(crate) fn prf_addr_into(&self, addr: Address, key: &[u8], out: &mut [u8]) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_PRF, &mut pref[..n]);
        let addr_bytes = addr.to_bytes();
        self.hash_parts_into(&[&pref[..n], key, &addr_bytes], out);
    }

    fn prf_addr_with_state(&self, state: &PrfState, seed: &[u8], addr: Address, out: &mut [u8]) {
        match state {
            PrfState::Sha256(h) => {
                let mut h = h.clone();
                h.update(addr.to_bytes());
                let digest = h.finalize();
                out.copy_from_slice(&digest[..out.len()]);
            }
            PrfState::Sha512(h) => {
                let mut h = h.clone();
                h.update(addr.to_bytes());
                let digest = h.finalize();
                out.copy_from_slice(&digest[..out.len()]);
            }
            PrfState::Shake => self.prf_addr_into(addr, seed, out),
        }
    }

    /// Compute PRF(pubSeed, addr) from the precomputed prefix.
    pub(crate) fn prf_addr_pub_into(&self, ph: &PrecomputedHashes, addr: Address, out: &mut [u8]) {
        self.prf_addr_with_state(&ph.prf_pub, &ph.pub_seed, addr, out);
    }

    /// Compute PRF(skSeed, addr) from the precomputed prefix.
    pub(crate) fn prf_addr_sk_into(&self, ph: &PrecomputedHashes, addr: Address, out: &mut [u8]) {
        match &ph.prf_sk {
            Some(state) => self.prf_addr_with_state(state, ph.sk_seed(), addr, out),
            None => panic!("precomputed hashes lack the secret seed"),
        }
    }

    /// Compute PRF(key, i) where i is encoded as a 32-byte big-endian
    /// integer.
    pub(crate) fn prf_u64_into(&self, i: u64, key: &[u8], out: &mut [u8]) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_PRF, &mut pref[..n]);
        let mut index = [0u8; 32];
        encode_u64_into(i, &mut index);
        self.hash_parts_into(&[&pref[..n], key, &index], out);
    }

    pub(crate) fn prf_u64(&self, i: u64, key: &[u8]) -> Vec<u8> {
        let mut ret = vec![0u8; self.n()];
        self.prf_u64_into(i, key, &mut ret);
        ret
    }

    /// Compute PRF_keygen(skSeed, pubSeed ‖ addr), the NIST SP 800-208
    /// chain-seed derivation.
    pub(crate) fn prf_keygen_into(&self, ph: &PrecomputedHashes, addr: Address, out: &mut [u8]) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_PRF_KEYGEN, &mut pref[..n]);
        let addr_bytes = addr.to_bytes();
        self.hash_parts_into(&[&pref[..n], ph.sk_seed(), &ph.pub_seed, &addr_bytes], out);
    }

    /// Compute the WOTS+ one-way function F in place:
    /// `inout = H(pad_F ‖ key ‖ (bitmask ⊕ inout))` with key and
    /// bitmask drawn from PRF(pubSeed, ·).
    pub(crate) fn f_inplace(&self, inout: &mut [u8], ph: &PrecomputedHashes, addr: &mut Address) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_F, &mut pref[..n]);
        let mut key = [0u8; 64];
        let mut masked = [0u8; 64];
        addr.set_key_and_mask(0);
        self.prf_addr_pub_into(ph, *addr, &mut key[..n]);
        addr.set_key_and_mask(1);
        self.prf_addr_pub_into(ph, *addr, &mut masked[..n]);
        xor_into(&mut masked[..n], inout);
        self.hash_parts_into(&[&pref[..n], &key[..n], &masked[..n]], inout);
    }

    /// Compute the tree-compression hash
    /// `out = H(pad_H ‖ key ‖ (bm0 ⊕ left) ‖ (bm1 ⊕ right))`.
    pub(crate) fn h_into(
        &self,
        left: &[u8],
        right: &[u8],
        ph: &PrecomputedHashes,
        addr: &mut Address,
        out: &mut [u8],
    ) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_H, &mut pref[..n]);
        let mut key = [0u8; 64];
        let mut masked_left = [0u8; 64];
        let mut masked_right = [0u8; 64];
        addr.set_key_and_mask(0);
        self.prf_addr_pub_into(ph, *addr, &mut key[..n]);
        addr.set_key_and_mask(1);
        self.prf_addr_pub_into(ph, *addr, &mut masked_left[..n]);
        addr.set_key_and_mask(2);
        self.prf_addr_pub_into(ph, *addr, &mut masked_right[..n]);
        xor_into(&mut masked_left[..n], left);
        xor_into(&mut masked_right[..n], right);
        self.hash_parts_into(
            &[&pref[..n], &key[..n], &masked_left[..n], &masked_right[..n]],
            out,
        );
    }

    /// Compute the randomised message digest
    /// `H(pad_hash ‖ R ‖ root ‖ toByte(idx, n) ‖ msg)`.
    pub(crate) fn hash_message_into(
        &self,
        msg: &[u8],
        r: &[u8],
        root: &[u8],
        idx: u64,
        out: &mut [u8],
    ) {
        let n = self.n();
        let mut pref = [0u8; 64];
        encode_u64_into(HASH_PADDING_HASH, &mut pref[..n]);
        let mut index = [0u8; 64];
        encode_u64_into(idx, &mut index[..n]);
        self.hash_parts_into(&[&pref[..n], r, root, &index[..n], msg], out);
    }

    /// Whether the 4-way Keccak path applies to this instance.
    pub(crate) fn fourway_available(&self) -> bool {
        self.body == HashBody::Shake128 && matches!(self.p.n, 16 | 32)
    }

    /// Set `outs[i] = PRF(key, addrs[i])` for the lanes whose output is
    /// present, in a single four-way permutation.
    ///
    /// Only valid when [`Context::fourway_available`] holds.
    pub(crate) fn prf_addr_x4_into(
        &self,
        x4: &mut ShakeX4,
        key: &[u8],
        addrs: &[Address; 4],
        outs: [Option<&mut [u8]>; 4],
    ) {
        let n = self.n();
        let in_len = 2 * n + 32;
        let active = [
            outs[0].is_some(),
            outs[1].is_some(),
            outs[2].is_some(),
            outs[3].is_some(),
        ];
        let mut bufs = [[0u8; 96]; 4];
        for (lane, buf) in bufs.iter_mut().enumerate() {
            if !active[lane] {
                continue;
            }
            encode_u64_into(HASH_PADDING_PRF, &mut buf[..n]);
            buf[n..2 * n].copy_from_slice(key);
            addrs[lane].write_into(&mut buf[2 * n..2 * n + 32]);
        }
        let [b0, b1, b2, b3] = &bufs;
        x4.shake128(
            [
                if active[0] { Some(&b0[..in_len]) } else { None },
                if active[1] { Some(&b1[..in_len]) } else { None },
                if active[2] { Some(&b2[..in_len]) } else { None },
                if active[3] { Some(&b3[..in_len]) } else { None },
            ],
            outs,
        );
    }

    /// Apply F to up to four chain values in place, one four-way
    /// permutation per PRF round plus one for the outer hash.  Inactive
    /// lanes are left untouched.
    pub(crate) fn f_x4_inplace(
        &self,
        x4: &mut ShakeX4,
        ph: &PrecomputedHashes,
        addrs: &mut [Address; 4],
        values: &mut [[u8; 64]; 4],
        active: [bool; 4],
    ) {
        let n = self.n();
        let mut keys = [[0u8; 32]; 4];
        let mut masks = [[0u8; 32]; 4];

        for (lane, addr) in addrs.iter_mut().enumerate() {
            if active[lane] {
                addr.set_key_and_mask(0);
            }
        }
        {
            let [k0, k1, k2, k3] = &mut keys;
            self.prf_addr_x4_into(
                x4,
                &ph.pub_seed,
                addrs,
                [
                    if active[0] { Some(&mut k0[..n]) } else { None },
                    if active[1] { Some(&mut k1[..n]) } else { None },
                    if active[2] { Some(&mut k2[..n]) } else { None },
                    if active[3] { Some(&mut k3[..n]) } else { None },
                ],
            );
        }
        for (lane, addr) in addrs.iter_mut().enumerate() {
            if active[lane] {
                addr.set_key_and_mask(1);
            }
        }
        {
            let [m0, m1, m2, m3] = &mut masks;
            self.prf_addr_x4_into(
                x4,
                &ph.pub_seed,
                addrs,
                [
                    if active[0] { Some(&mut m0[..n]) } else { None },
                    if active[1] { Some(&mut m1[..n]) } else { None },
                    if active[2] { Some(&mut m2[..n]) } else { None },
                    if active[3] { Some(&mut m3[..n]) } else { None },
                ],
            );
        }

        let mut bufs = [[0u8; 96]; 4];
        for (lane, buf) in bufs.iter_mut().enumerate() {
            if !active[lane] {
                continue;
            }
            encode_u64_into(HASH_PADDING_F, &mut buf[..n]);
            buf[n..2 * n].copy_from_slice(&keys[lane][..n]);
            buf[2 * n..3 * n].copy_from_slice(&masks[lane][..n]);
            xor_into(&mut buf[2 * n..3 * n], &values[lane][..n]);
        }
        let [b0, b1, b2, b3] = &bufs;
        let [v0, v1, v2, v3] = values;
        x4.shake128(
            [
                if active[0] { Some(&b0[..3 * n]) } else { None },
                if active[1] { Some(&b1[..3 * n]) } else { None },
                if active[2] { Some(&b2[..3 * n]) } else { None },
                if active[3] { Some(&b3[..3 * n]) } else { None },
            ],
            [
                if active[0] { Some(&mut v0[..n]) } else { None },
                if active[1] { Some(&mut v1[..n]) } else { None },
                if active[2] { Some(&mut v2[..n]) } else { None },
                if active[3] { Some(&mut v3[..n]) } else { None },
            ],
        );
    }
}
