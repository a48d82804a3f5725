//! The [`Context`] of an XMSS[MT] instance: validated parameters plus
//! the quantities derived from them.

use std::fmt;

use crate::address::SubTreeAddress;
use crate::error::{Error, Result};
use crate::hash::HashBody;
use crate::params::{registry_lookup_name, registry_lookup_oid, Params};

/// An XMSS[MT] instance.
///
/// Create one using [`Context::from_name`], [`Context::from_oid`] or
/// [`Context::new`].
#[derive(Clone, Debug)]
pub struct Context {
    /// Number of worker threads to use for expensive operations.
    /// An appropriate number is guessed if set to 0.
    pub threads: usize,

    pub(crate) p: Params,
    pub(crate) mt: bool,
    pub(crate) oid: u32,
    pub(crate) name: Option<&'static str>,
    pub(crate) wots_log_w: u32,
    pub(crate) wots_len1: u32,
    pub(crate) wots_len2: u32,
    pub(crate) wots_len: u32,
    pub(crate) wots_sig_bytes: u32,
    pub(crate) tree_height: u32,
    pub(crate) index_bytes: u32,
    pub(crate) sig_bytes: u32,
    pub(crate) pk_bytes: u32,
    pub(crate) body: HashBody,
}

impl Context {
    /// Creates a context for the given parameters.
    pub fn new(params: Params) -> Result<Context> {
        if !matches!(params.n, 16 | 24 | 32 | 64) {
            return Err(Error::InvalidParameters(
                "only n=16,24,32,64 are supported".into(),
            ));
        }
        if params.d == 0 {
            return Err(Error::InvalidParameters("d can't be zero".into()));
        }
        if params.full_height == 0 || params.full_height > 63 {
            return Err(Error::InvalidParameters(
                "full_height must lie in 1..=63".into(),
            ));
        }
        if params.full_height % params.d != 0 {
            return Err(Error::InvalidParameters(
                "d does not divide full_height".into(),
            ));
        }
        if !matches!(params.wots_w, 4 | 16 | 256) {
            return Err(Error::InvalidParameters(
                "only WotsW=4,16,256 are supported".into(),
            ));
        }

        let mt = params.d > 1;
        let tree_height = params.full_height / params.d;
        let index_bytes = if mt { (params.full_height + 7) / 8 } else { 4 };
        let wots_sig_bytes = params.wots_signature_size();
        let (name, oid) = match params.lookup_name_and_oid() {
            Some((name, oid)) => (Some(name), oid),
            None => (None, 0),
        };

        Ok(Context {
            threads: 0,
            p: params,
            mt,
            oid,
            name,
            wots_log_w: params.wots_log_w(),
            wots_len1: params.wots_len1(),
            wots_len2: params.wots_len2(),
            wots_len: params.wots_len(),
            wots_sig_bytes,
            tree_height,
            index_bytes,
            sig_bytes: index_bytes
                + params.n
                + params.d * wots_sig_bytes
                + params.full_height * params.n,
            pk_bytes: 2 * params.n,
            body: HashBody::select(&params),
        })
    }

    /// Returns the context for the named XMSS[MT] instance, and `None`
    /// if the algorithm name is not listed in RFC 8391 or SP 800-208.
    /// See [`crate::params::list_names`].  Unlisted instances go
    /// through [`Params::parse`] and [`Context::new`].
    pub fn from_name(name: &str) -> Option<Context> {
        let entry = registry_lookup_name(name)?;
        Context::new(entry.params).ok()
    }

    /// Returns the context for the XMSS (mt = false) or XMSS^MT
    /// (mt = true) instance with the given OID, if there is one.
    pub fn from_oid(mt: bool, oid: u32) -> Option<Context> {
        let entry = registry_lookup_oid(mt, oid)?;
        Context::new(entry.params).ok()
    }

    /// Returns the name of the instance and `None` if it has no name.
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Returns the OID of the instance and 0 if it has none.
    pub fn oid(&self) -> u32 {
        self.oid
    }

    /// Whether this is an XMSS^MT instance (as opposed to XMSS).
    pub fn mt(&self) -> bool {
        self.mt
    }

    /// The parameters of the instance.
    pub fn params(&self) -> Params {
        self.p
    }

    /// The size of signatures of this instance, excluding the 4-byte
    /// parameter header.
    pub fn signature_size(&self) -> u32 {
        self.sig_bytes
    }

    /// Whether the instance is listed in NIST SP 800-208.
    pub fn from_nist(&self) -> bool {
        if self.mt {
            (0x21..=0x38).contains(&self.oid)
        } else {
            (0x0d..=0x15).contains(&self.oid)
        }
    }

    /// Whether the instance is listed in RFC 8391 (and thus should be
    /// supported by other implementations).
    pub fn from_rfc(&self) -> bool {
        if self.oid == 0 {
            return false;
        }
        if self.mt {
            self.oid <= 0x20
        } else {
            self.oid <= 0x0c
        }
    }

    pub(crate) fn n(&self) -> usize {
        self.p.n as usize
    }

    pub(crate) fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            return self.threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// The subtrees along the hypertree path for the given sequence
    /// number, bottom layer first, together with the leaf index within
    /// each subtree.
    pub(crate) fn subtree_path_for_seq_no(
        &self,
        seq_no: u64,
    ) -> (Vec<SubTreeAddress>, Vec<u32>) {
        let d = self.p.d as usize;
        let mut path = Vec::with_capacity(d);
        let mut leafs = Vec::with_capacity(d);
        let mask = (1u64 << self.tree_height) - 1;
        for layer in 0..d as u32 {
            path.push(SubTreeAddress {
                layer,
                tree: seq_no >> ((layer + 1) * self.tree_height),
            });
            leafs.push(((seq_no >> (layer * self.tree_height)) & mask) as u32);
        }
        (path, leafs)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.p.fmt(f)
    }
}

/// Preallocated working memory for a single thread.  Subtree workers
/// each carry their own pad so no compression-state buffers are shared.
pub(crate) struct ScratchPad {
    /// Workspace for a WOTS+ public key (`len·n` bytes).
    pub(crate) wots_pk: Vec<u8>,
    /// Workspace for base-w chain lengths (`len` digits).
    pub(crate) lengths: Vec<u8>,
}

impl Context {
    pub(crate) fn new_scratch_pad(&self) -> ScratchPad {
        ScratchPad {
            wots_pk: vec![0u8; (self.wots_len * self.p.n) as usize],
            lengths: vec![0u8; self.wots_len as usize],
        }
    }
}
