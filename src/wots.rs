//! The WOTS+ one-time signature scheme underlying every leaf of the
//! hypertree.
//!
//! A message digest is decomposed into base-w digits, a checksum in
//! base-w is appended, and each digit selects a position on a hash
//! chain.  Signing releases the chain values at those positions;
//! verification advances them to the chain ends and recovers the
//! public key.

use zeroize::Zeroizing;

use crate::address::Address;
use crate::context::{Context, ScratchPad};
use crate::hash::fourway::ShakeX4;
use crate::hash::PrecomputedHashes;
use crate::params::PrfConstruction;
use crate::utils::encode_u64_into;

impl Context {
    /// Converts `input` into base-w digits.  Only works when log2(w)
    /// divides 8, i.e. w ∈ {4, 16, 256}.
    pub(crate) fn to_base_w(&self, input: &[u8], output: &mut [u8]) {
        let log_w = self.wots_log_w;
        let w_mask = (self.p.wots_w - 1) as u8;
        let mut in_idx = 0usize;
        let mut bits = 0u32;
        let mut total = 0u8;
        for out in output.iter_mut() {
            if bits == 0 {
                total = input[in_idx];
                in_idx += 1;
                bits = 8;
            }
            bits -= log_w;
            *out = (total >> bits) & w_mask;
        }
    }

    /// Converts an n-byte message digest into positions on the WOTS+
    /// chains: the base-w decomposition of the digest followed by a
    /// base-w checksum, left-shifted into byte alignment.  The digest
    /// itself is never mutated.
    pub(crate) fn wots_chain_lengths(&self, msg: &[u8], lengths: &mut [u8]) {
        let len1 = self.wots_len1 as usize;
        let len2 = self.wots_len2 as usize;
        self.to_base_w(msg, &mut lengths[..len1]);

        let mut csum: u64 = 0;
        for &digit in &lengths[..len1] {
            csum += u64::from(self.p.wots_w - 1) - u64::from(digit);
        }
        csum <<= 8 - ((len2 as u32 * self.wots_log_w) % 8);

        let csum_bytes = ((len2 as u32 * self.wots_log_w + 7) / 8) as usize;
        let mut buf = [0u8; 8];
        encode_u64_into(csum, &mut buf[..csum_bytes]);
        self.to_base_w(&buf[..csum_bytes], &mut lengths[len1..]);
    }

    /// Derives the seed for the WOTS+ keypair at the given OTS address
    /// from the secret key seed.  (RFC 8391 construction.)
    pub(crate) fn get_wots_seed_into(
        &self,
        ph: &PrecomputedHashes,
        ots_addr: Address,
        out: &mut [u8],
    ) {
        let mut addr = ots_addr;
        addr.set_chain(0);
        addr.set_hash(0);
        addr.set_key_and_mask(0);
        self.prf_addr_sk_into(ph, addr, out);
    }

    /// Expands the secret key seed into the `len` chain-start values.
    fn wots_expand_seed_into(&self, ph: &PrecomputedHashes, ots_addr: Address, out: &mut [u8]) {
        let n = self.n();
        match self.p.prf {
            PrfConstruction::Rfc => {
                let mut seed = Zeroizing::new(vec![0u8; n]);
                self.get_wots_seed_into(ph, ots_addr, &mut seed);
                for i in 0..self.wots_len as usize {
                    self.prf_u64_into(i as u64, &seed, &mut out[i * n..(i + 1) * n]);
                }
            }
            PrfConstruction::Nist => {
                let mut addr = ots_addr;
                addr.set_hash(0);
                addr.set_key_and_mask(0);
                for i in 0..self.wots_len as usize {
                    addr.set_chain(i as u32);
                    self.prf_keygen_into(ph, addr, &mut out[i * n..(i + 1) * n]);
                }
            }
        }
    }

    /// Advances `value`, the `start`-th value of its chain, by `steps`
    /// applications of F.  `addr` must carry the chain address.
    pub(crate) fn wots_gen_chain_inplace(
        &self,
        value: &mut [u8],
        start: u32,
        steps: u32,
        ph: &PrecomputedHashes,
        addr: &mut Address,
    ) {
        let w = u32::from(self.p.wots_w);
        let mut i = start;
        while i < start + steps && i < w {
            addr.set_hash(i);
            self.f_inplace(value, ph, addr);
            i += 1;
        }
    }

    /// Advances all `len` chains of `buf` from `starts[i]` by
    /// `steps[i]`.  On SHAKE-128 instances the chains are sorted by
    /// remaining step count and processed four per Keccak permutation;
    /// when fewer than four chains remain at a given height the
    /// corresponding lanes go idle rather than produce spurious output.
    fn wots_gen_chains_inplace(
        &self,
        buf: &mut [u8],
        starts: &[u8],
        steps: &[u8],
        ph: &PrecomputedHashes,
        base_addr: Address,
    ) {
        let n = self.n();
        let len = self.wots_len as usize;
        let w = u32::from(self.p.wots_w);

        if !self.fourway_available() {
            let mut addr = base_addr;
            for i in 0..len {
                addr.set_chain(i as u32);
                self.wots_gen_chain_inplace(
                    &mut buf[i * n..(i + 1) * n],
                    u32::from(starts[i]),
                    u32::from(steps[i]),
                    ph,
                    &mut addr,
                );
            }
            return;
        }

        let mut order: Vec<usize> = (0..len).collect();
        order.sort_by(|&a, &b| steps[b].cmp(&steps[a]).then(a.cmp(&b)));

        let mut x4 = ShakeX4::new();
        for group in order.chunks(4) {
            let mut values = [[0u8; 64]; 4];
            let mut addrs = [base_addr; 4];
            let mut pos = [0u32; 4];
            let mut remaining = [0u32; 4];
            for (lane, &chain) in group.iter().enumerate() {
                values[lane][..n].copy_from_slice(&buf[chain * n..(chain + 1) * n]);
                addrs[lane].set_chain(chain as u32);
                pos[lane] = u32::from(starts[chain]);
                remaining[lane] = u32::from(steps[chain]).min(w.saturating_sub(pos[lane]));
            }
            loop {
                let active = [
                    remaining[0] > 0,
                    remaining[1] > 0,
                    remaining[2] > 0,
                    remaining[3] > 0,
                ];
                if !active.iter().any(|&a| a) {
                    break;
                }
                for lane in 0..4 {
                    if active[lane] {
                        addrs[lane].set_hash(pos[lane]);
                    }
                }
                self.f_x4_inplace(&mut x4, ph, &mut addrs, &mut values, active);
                for lane in 0..4 {
                    if active[lane] {
                        pos[lane] += 1;
                        remaining[lane] -= 1;
                    }
                }
            }
            for (lane, &chain) in group.iter().enumerate() {
                buf[chain * n..(chain + 1) * n].copy_from_slice(&values[lane][..n]);
            }
        }
    }

    /// Generates the WOTS+ public key for the keypair at `ots_addr`
    /// into `out` (`len·n` bytes).
    pub(crate) fn wots_pk_gen_into(
        &self,
        ph: &PrecomputedHashes,
        ots_addr: Address,
        out: &mut [u8],
    ) {
        self.wots_expand_seed_into(ph, ots_addr, out);
        let len = self.wots_len as usize;
        let starts = vec![0u8; len];
        let steps = vec![(self.p.wots_w - 1) as u8; len];
        self.wots_gen_chains_inplace(out, &starts, &steps, ph, ots_addr);
    }

    /// Signs the n-byte message digest under the keypair at `ots_addr`
    /// into `out` (`len·n` bytes).
    pub(crate) fn wots_sign_into(
        &self,
        pad: &mut ScratchPad,
        msg_hash: &[u8],
        ph: &PrecomputedHashes,
        ots_addr: Address,
        out: &mut [u8],
    ) {
        self.wots_chain_lengths(msg_hash, &mut pad.lengths);
        self.wots_expand_seed_into(ph, ots_addr, out);
        let starts = vec![0u8; self.wots_len as usize];
        self.wots_gen_chains_inplace(out, &starts, &pad.lengths, ph, ots_addr);
    }

    /// Recovers the WOTS+ public key from a signature over the given
    /// message digest, into `out` (`len·n` bytes).
    pub(crate) fn wots_pk_from_sig_into(
        &self,
        pad: &mut ScratchPad,
        sig: &[u8],
        msg_hash: &[u8],
        ph: &PrecomputedHashes,
        ots_addr: Address,
        out: &mut [u8],
    ) {
        self.wots_chain_lengths(msg_hash, &mut pad.lengths);
        out.copy_from_slice(sig);
        let w1 = (self.p.wots_w - 1) as u8;
        let steps: Vec<u8> = pad.lengths.iter().map(|&l| w1 - l).collect();
        self.wots_gen_chains_inplace(out, &pad.lengths, &steps, ph, ots_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{HashFunc, Params};
    use sha2::{Digest, Sha256};

    fn ctx(name: &str) -> Context {
        Context::from_name(name).unwrap()
    }

    fn test_addr() -> Address {
        let mut words = [0u32; 8];
        for (i, w) in words.iter_mut().enumerate() {
            *w = 500000000u32.wrapping_mul(i as u32);
        }
        Address::from(words)
    }

    fn seq_bytes(n: usize, factor: usize) -> Vec<u8> {
        (0..n).map(|i| (factor * i) as u8).collect()
    }

    fn check_gen_chain(ctx: &Context, expect: &str) {
        let n = ctx.n();
        let pub_seed = seq_bytes(n, 2);
        let ph = ctx.precompute_hashes(&pub_seed, None);
        let mut addr = test_addr();
        let mut value = seq_bytes(n, 1);
        ctx.wots_gen_chain_inplace(&mut value, 4, 5, &ph, &mut addr);
        assert_eq!(hex::encode(&value), expect, "{}", ctx);
    }

    #[test]
    fn gen_chain_reference_values() {
        check_gen_chain(
            &ctx("XMSS-SHA2_10_256"),
            "2dd7fcc039afb02d35c4b370172a7714b909d74a6ef2463538e87b05ab573d18",
        );
        check_gen_chain(
            &ctx("XMSS-SHA2_10_512"),
            "9b4cda48d43e57bf4b5eb57c7bd86126d523517f9f27dbe287c8501d3c00f4f1e37fab649ac4bec337bc92623acc837af3ac5be17ed1624a335eb02d0771a68c",
        );
        check_gen_chain(
            &ctx("XMSS-SHAKE_10_256"),
            "14f78e435e3758a862fedea60af053374390d9cc3b140a2221e03281b2d84cf0",
        );
        check_gen_chain(
            &ctx("XMSS-SHAKE_10_512"),
            "252e91e199a755ef156c9671f1e35d1853653f2956a167bc548ae3def7fc7f0842f2825ed674c212cb156c0c2908c8d3835d22c5aaf1140bcc0cffdc8b96b89f",
        );
    }

    fn sha256_prefix(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        hex::encode(&digest[..8])
    }

    fn check_pk_gen(ctx: &Context, expect: &str) {
        let n = ctx.n();
        let pub_seed = seq_bytes(n, 2);
        let sk_seed = seq_bytes(n, 1);
        let ph = ctx.precompute_hashes(&pub_seed, Some(&sk_seed));
        let mut pk = vec![0u8; (ctx.wots_len as usize) * n];
        ctx.wots_pk_gen_into(&ph, test_addr(), &mut pk);
        assert_eq!(sha256_prefix(&pk), expect, "{}", ctx);
    }

    #[test]
    fn pk_gen_reference_values() {
        check_pk_gen(&ctx("XMSS-SHA2_10_256"), "6a796e5e8c68a83d");
        check_pk_gen(&ctx("XMSS-SHA2_10_512"), "16d2cc6a8313c1ce");
        check_pk_gen(&ctx("XMSS-SHAKE_10_256"), "c4bc21424790e484");
        check_pk_gen(&ctx("XMSS-SHAKE_10_512"), "776f57dd57898069");
    }

    fn check_sign(ctx: &Context, expect: &str) {
        let n = ctx.n();
        let pub_seed = seq_bytes(n, 2);
        let sk_seed = seq_bytes(n, 1);
        let msg = seq_bytes(n, 3);
        let ph = ctx.precompute_hashes(&pub_seed, Some(&sk_seed));
        let mut pad = ctx.new_scratch_pad();
        let mut sig = vec![0u8; (ctx.wots_len as usize) * n];
        ctx.wots_sign_into(&mut pad, &msg, &ph, test_addr(), &mut sig);
        assert_eq!(sha256_prefix(&sig), expect, "{}", ctx);
    }

    #[test]
    fn sign_reference_values() {
        check_sign(&ctx("XMSS-SHA2_10_256"), "81aae34c799751d3");
        check_sign(&ctx("XMSS-SHA2_10_512"), "f3506bcdddda4a6b");
        check_sign(&ctx("XMSS-SHAKE_10_256"), "d68aaeaddda3d555");
        check_sign(&ctx("XMSS-SHAKE_10_512"), "f530147152ac0893");
    }

    fn check_sign_then_verify(ctx: &Context) {
        let n = ctx.n();
        let pub_seed = seq_bytes(n, 2);
        let sk_seed = seq_bytes(n, 1);
        let msg = seq_bytes(n, 3);
        let ph_sk = ctx.precompute_hashes(&pub_seed, Some(&sk_seed));
        let ph_pub = ctx.precompute_hashes(&pub_seed, None);
        let mut pad = ctx.new_scratch_pad();
        let wots_bytes = (ctx.wots_len as usize) * n;

        let mut sig = vec![0u8; wots_bytes];
        ctx.wots_sign_into(&mut pad, &msg, &ph_sk, test_addr(), &mut sig);

        let mut pk_from_sig = vec![0u8; wots_bytes];
        ctx.wots_pk_from_sig_into(&mut pad, &sig, &msg, &ph_pub, test_addr(), &mut pk_from_sig);

        let mut pk = vec![0u8; wots_bytes];
        ctx.wots_pk_gen_into(&ph_sk, test_addr(), &mut pk);

        assert_eq!(pk_from_sig, pk, "{}", ctx);
    }

    #[test]
    fn sign_then_verify_named_instances() {
        for name in [
            "XMSS-SHA2_10_256",
            "XMSS-SHA2_10_512",
            "XMSS-SHA2_10_192",
            "XMSS-SHAKE_10_256",
            "XMSS-SHAKE_10_512",
            "XMSS-SHAKE256_10_256",
            "XMSS-SHAKE256_10_192",
        ] {
            check_sign_then_verify(&ctx(name));
        }
    }

    #[test]
    fn sign_then_verify_unnamed_instances() {
        for func in [HashFunc::Sha2, HashFunc::Shake] {
            for wots_w in [4u16, 16, 256] {
                let ctx = Context::new(Params {
                    func,
                    n: 16,
                    full_height: 1,
                    d: 1,
                    wots_w,
                    prf: crate::params::PrfConstruction::Rfc,
                })
                .unwrap();
                check_sign_then_verify(&ctx);
            }
        }
    }

    #[test]
    fn nist_prf_changes_key_derivation() {
        let rfc = Context::new(Params {
            func: HashFunc::Sha2,
            n: 32,
            full_height: 1,
            d: 1,
            wots_w: 16,
            prf: crate::params::PrfConstruction::Rfc,
        })
        .unwrap();
        let nist = Context::new(Params {
            prf: crate::params::PrfConstruction::Nist,
            ..rfc.params()
        })
        .unwrap();
        check_sign_then_verify(&nist);

        let n = rfc.n();
        let pub_seed = seq_bytes(n, 2);
        let sk_seed = seq_bytes(n, 1);
        let mut pk_rfc = vec![0u8; (rfc.wots_len as usize) * n];
        let mut pk_nist = pk_rfc.clone();
        let ph_rfc = rfc.precompute_hashes(&pub_seed, Some(&sk_seed));
        let ph_nist = nist.precompute_hashes(&pub_seed, Some(&sk_seed));
        rfc.wots_pk_gen_into(&ph_rfc, test_addr(), &mut pk_rfc);
        nist.wots_pk_gen_into(&ph_nist, test_addr(), &mut pk_nist);
        assert_ne!(pk_rfc, pk_nist);
    }

    #[test]
    fn base_w_round_trips() {
        for &(wots_w, log_w) in &[(4u16, 2u32), (16, 4), (256, 8)] {
            let ctx = Context::new(Params {
                func: HashFunc::Sha2,
                n: 32,
                full_height: 1,
                d: 1,
                wots_w,
                prf: crate::params::PrfConstruction::Rfc,
            })
            .unwrap();
            let input = seq_bytes(32, 7);
            let digits_per_byte = 8 / log_w as usize;
            let mut digits = vec![0u8; 32 * digits_per_byte];
            ctx.to_base_w(&input, &mut digits);
            // re-encode the digits and compare to the original bytes
            let mut rebuilt = vec![0u8; 32];
            for (i, chunk) in digits.chunks(digits_per_byte).enumerate() {
                let mut byte = 0u8;
                for &d in chunk {
                    byte = (byte << log_w) | d;
                }
                rebuilt[i] = byte;
            }
            assert_eq!(rebuilt, input, "w={}", wots_w);
        }
    }

    #[test]
    fn chain_lengths_leave_the_digest_untouched() {
        let ctx = ctx("XMSS-SHA2_10_256");
        let msg = seq_bytes(32, 5);
        let snapshot = msg.clone();
        let mut lengths = vec![0u8; ctx.wots_len as usize];
        ctx.wots_chain_lengths(&msg, &mut lengths);
        assert_eq!(msg, snapshot);
        // every digit is a valid chain position
        assert!(lengths.iter().all(|&l| u16::from(l) < ctx.params().wots_w));
    }
}
