//! XMSS and XMSS^MT stateful hash-based signatures (RFC 8391 and NIST
//! SP 800-208).
//!
//! The private key is *stateful*: every signature consumes a sequence
//! number and using one twice destroys the security of the scheme.
//! Keys therefore live in a persistent on-disk container that advances
//! the sequence number durably before a signature is released, caches
//! precomputed subtrees to amortise signing cost, and recovers safely
//! from crashes.
//!
//! ```no_run
//! use xmssmt::Context;
//!
//! # fn main() -> xmssmt::Result<()> {
//! let ctx = Context::from_name("XMSSMT-SHA2_60/12_256").unwrap();
//! let (sk, pk) = ctx.generate_key_pair("my.key")?;
//! let sig = sk.sign(b"hello world")?;
//! assert!(pk.verify(&sig, b"hello world")?);
//! sk.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Use [`params::list_names`] to list the supported named instances;
//! unlisted parameter combinations go through [`Params::parse`] or
//! [`Context::new`].

mod address;
mod container;
mod context;
mod error;
mod hash;
mod key;
mod merkle;
pub mod params;
mod utils;
mod wots;

pub use address::SubTreeAddress;
pub use context::Context;
pub use error::{Error, Result};
pub use key::{load_private_key, PrivateKey, PublicKey, Signature, SubTreeSig};
pub use params::{HashFunc, Params, PrfConstruction};

use std::path::Path;

/// Generates a new keypair for the named XMSS[MT] instance and stores
/// the private key at `path`.  See [`Context::generate_key_pair`].
pub fn generate_key_pair(
    alg: &str,
    path: impl AsRef<Path>,
) -> Result<(PrivateKey, PublicKey)> {
    let ctx = Context::from_name(alg).ok_or_else(|| {
        Error::InvalidParameters(format!("{} is not a valid algorithm name", alg))
    })?;
    ctx.generate_key_pair(path)
}

/// Creates a signature on `msg` using the private key stored at `path`.
///
/// For more flexibility, use [`load_private_key`] and
/// [`PrivateKey::sign`].
pub fn sign(path: impl AsRef<Path>, msg: &[u8]) -> Result<Vec<u8>> {
    let (sk, _, _) = load_private_key(path)?;
    let sig = sk.sign(msg)?;
    let bytes = sig.to_bytes()?;
    sk.close()?;
    Ok(bytes)
}

/// Checks whether `sig` is a valid signature of `pk` on `msg`.
pub fn verify(pk: &[u8], sig: &[u8], msg: &[u8]) -> Result<bool> {
    let pk = PublicKey::from_bytes(pk)?;
    let sig = Signature::from_bytes(sig)?;
    pk.verify(&sig, msg)
}
