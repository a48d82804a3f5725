//! Algorithm parameters, the registry of named XMSS[MT] instances and
//! the compressed 4-byte parameter header.

use std::fmt;

use crate::error::{Error, Result};
use crate::utils::bytes_to_u32;

/// Hash function of an XMSS[MT] instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HashFunc {
    /// SHA-256 for n ≤ 32 and SHA-512 otherwise.  (From RFC 8391.)
    Sha2 = 0,
    /// SHAKE-128 for n ≤ 32 and SHAKE-256 otherwise.  (From RFC 8391.)
    Shake = 1,
    /// SHAKE-256 regardless of n.  (From NIST SP 800-208.)
    Shake256 = 2,
}

impl HashFunc {
    fn from_code(code: u32) -> Result<HashFunc> {
        match code {
            0 => Ok(HashFunc::Sha2),
            1 => Ok(HashFunc::Shake),
            2 => Ok(HashFunc::Shake256),
            _ => Err(Error::Serde(format!("unknown hash function code {}", code))),
        }
    }
}

impl fmt::Display for HashFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashFunc::Sha2 => write!(f, "SHA2"),
            HashFunc::Shake => write!(f, "SHAKE"),
            HashFunc::Shake256 => write!(f, "SHAKE256"),
        }
    }
}

/// How the PRFs are constructed from the hash function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PrfConstruction {
    /// As described by RFC 8391.
    Rfc = 0,
    /// As described by NIST SP 800-208.
    Nist = 1,
}

/// Parameters of an XMSS[MT] instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Params {
    /// Hash function to use.
    pub func: HashFunc,
    /// Security parameter: length of hashes, in bytes.
    pub n: u32,
    /// Full height of the hypertree.
    pub full_height: u32,
    /// Number of subtree layers; 1 for XMSS, more for XMSS^MT.
    pub d: u32,
    /// WOTS+ Winternitz parameter.  Only 4, 16 and 256 are supported.
    pub wots_w: u16,
    /// Method used to construct the PRFs.
    pub prf: PrfConstruction,
}

/// Magic of the compressed parameter header.
const PARAMS_MAGIC: u32 = 0xea;

impl Params {
    /// Returns the 2log of the Winternitz parameter.
    pub fn wots_log_w(&self) -> u32 {
        match self.wots_w {
            4 => 2,
            16 => 4,
            256 => 8,
            _ => panic!("only WotsW=4,16,256 are supported"),
        }
    }

    /// Returns the number of main WOTS+ chains.
    pub fn wots_len1(&self) -> u32 {
        8 * self.n / self.wots_log_w()
    }

    /// Returns the number of WOTS+ checksum chains.
    pub fn wots_len2(&self) -> u32 {
        match self.wots_w {
            4 => 2,
            16 => 3,
            256 => 5,
            _ => panic!("only WotsW=4,16,256 are supported"),
        }
    }

    /// Returns the total number of WOTS+ chains.
    pub fn wots_len(&self) -> u32 {
        self.wots_len1() + self.wots_len2()
    }

    /// Returns the size of a WOTS+ signature in bytes.
    pub fn wots_signature_size(&self) -> u32 {
        self.wots_len() * self.n
    }

    /// Returns the largest usable signature sequence number.
    pub fn max_signature_seq_no(&self) -> u64 {
        (1u64 << self.full_height) - 1
    }

    /// Size in bytes of a bare Merkle subtree: a complete binary tree
    /// of height `full_height/d + 1` over n-byte nodes.
    pub fn bare_subtree_size(&self) -> usize {
        let height = (self.full_height / self.d) + 1;
        (((1usize << height) - 1) * self.n as usize) as usize
    }

    /// Size in bytes of a cached subtree record body: the bare tree,
    /// space for the WOTS+ signature of its root under the parent tree,
    /// and a 64-bit integrity checksum.
    pub fn cached_subtree_size(&self) -> usize {
        self.bare_subtree_size() + self.wots_signature_size() as usize + 8
    }

    /// Size of the private key as stored by the container:
    /// skSeed ‖ skPrf ‖ pubSeed.  Note this is not the private-key size
    /// of the RFC, which also counts the sequence number, OID and root.
    pub fn private_key_size(&self) -> usize {
        (self.n * 3) as usize
    }

    /// Encodes the parameters into the reserved Oid space as follows
    /// (big endian):
    ///
    /// ```text
    ///    8-bit magic         0xEA
    ///    3-bit version       0
    ///    1-bit prf           0 for RFC, 1 for NIST
    ///    4-bit compr-n       (n/8)-1
    ///    2-bit hash          the hash function
    ///    2-bit w             0 for w=4, 1 for w=16, 2 for w=256
    ///    6-bit full-height
    ///    6-bit d
    /// ```
    ///
    /// XMSS is assumed if d == 1 and XMSS^MT otherwise.
    pub fn write_into(&self, buf: &mut [u8]) -> Result<()> {
        if self.n % 8 != 0 {
            return Err(Error::InvalidParameters("n is not divisible by 8".into()));
        }
        if self.n > 128 {
            return Err(Error::InvalidParameters("n is too large".into()));
        }
        if self.full_height > 63 {
            return Err(Error::InvalidParameters("full_height is too large".into()));
        }
        if self.d > 63 {
            return Err(Error::InvalidParameters("d is too large".into()));
        }
        let w_code: u32 = match self.wots_w {
            4 => 0,
            16 => 1,
            256 => 2,
            _ => {
                return Err(Error::InvalidParameters(
                    "only WotsW=4,16,256 are supported".into(),
                ))
            }
        };
        let mut val: u32 = PARAMS_MAGIC << 24;
        val |= (self.prf as u32) << 20;
        val |= ((self.n / 8) - 1) << 16;
        val |= (self.func as u32) << 14;
        val |= w_code << 12;
        val |= self.full_height << 6;
        val |= self.d;
        buf[..4].copy_from_slice(&val.to_be_bytes());
        Ok(())
    }

    /// Returns the compressed 4-byte parameter header.
    pub fn to_header(&self) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        self.write_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes parameters as encoded by [`Params::write_into`].
    pub fn from_header(buf: &[u8]) -> Result<Params> {
        if buf.len() < 4 {
            return Err(Error::Serde(format!(
                "parameter header must be 4 bytes long (instead of {})",
                buf.len()
            )));
        }
        let val = bytes_to_u32(&buf[..4]);
        if val >> 24 != PARAMS_MAGIC {
            return Err(Error::Serde(
                "these are not compressed parameters (magic is wrong)".into(),
            ));
        }
        if (val >> 21) & 0b111 != 0 {
            return Err(Error::Serde(
                "unsupported compressed parameters version".into(),
            ));
        }
        let wots_w = match (val >> 12) & 0b11 {
            0 => 4,
            1 => 16,
            2 => 256,
            _ => {
                return Err(Error::Serde(
                    "unsupported w-code in compressed parameters".into(),
                ))
            }
        };
        let prf = if (val >> 20) & 1 == 0 {
            PrfConstruction::Rfc
        } else {
            PrfConstruction::Nist
        };
        Ok(Params {
            func: HashFunc::from_code((val >> 14) & 0b11)?,
            n: (((val >> 16) & 0b1111) + 1) * 8,
            full_height: (val >> 6) & 0b111111,
            d: val & 0b111111,
            wots_w,
            prf,
        })
    }

    /// Returns parameters for a named XMSS[MT] instance listed in
    /// RFC 8391 or NIST SP 800-208, and `None` for any other name.
    pub fn from_name(name: &str) -> Option<Params> {
        REGISTRY
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.params)
    }

    /// Returns parameters for an XMSS[MT] instance which might not be
    /// listed in the RFC, by parsing names of the form
    /// `XMSS-<hash>_<h>_<n·8>[_w<W>][_NIST|_RFC]` and
    /// `XMSSMT-<hash>_<h>/<d>_<n·8>[_w<W>][_NIST|_RFC]`.
    pub fn parse(name: &str) -> Result<Params> {
        if let Some(params) = Params::from_name(name) {
            return Ok(params);
        }
        parse_params_from_name(name)
    }

    /// Returns the name and OID of this set of parameters, if it has
    /// them.
    pub fn lookup_name_and_oid(&self) -> Option<(&'static str, u32)> {
        REGISTRY
            .iter()
            .find(|entry| entry.params == *self)
            .map(|entry| (entry.name, entry.oid))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut w_string = String::new();
        let mut prf_string = "";
        if self.prf == PrfConstruction::Nist && self.n != 24 {
            prf_string = "_NIST";
        }
        if self.prf == PrfConstruction::Rfc && self.n == 24 {
            prf_string = "_RFC";
        }
        if self.wots_w != 16 {
            w_string = format!("_w{}", self.wots_w);
        }
        if self.d == 1 {
            write!(
                f,
                "XMSS-{}_{}_{}{}{}",
                self.func,
                self.full_height,
                self.n * 8,
                w_string,
                prf_string
            )
        } else {
            write!(
                f,
                "XMSSMT-{}_{}/{}_{}{}{}",
                self.func,
                self.full_height,
                self.d,
                self.n * 8,
                w_string,
                prf_string
            )
        }
    }
}

fn parse_params_from_name(name: &str) -> Result<Params> {
    let (alg, rest) = name
        .split_once('-')
        .ok_or_else(|| Error::Serde("missing separator between alg and params".into()))?;
    let mt = match alg {
        "XMSS" => false,
        "XMSSMT" => true,
        _ => return Err(Error::Serde(format!("no such algorithm: {}", alg))),
    };

    let bits: Vec<&str> = rest.split('_').collect();
    if bits.len() < 3 || bits.len() > 5 {
        return Err(Error::Serde(format!(
            "expected three, four or five parameters, not {}",
            bits.len()
        )));
    }

    let func = match bits[0] {
        "SHA2" => HashFunc::Sha2,
        "SHAKE" => HashFunc::Shake,
        "SHAKE256" => HashFunc::Shake256,
        other => return Err(Error::Serde(format!("no such hash function: {}", other))),
    };

    let (unparsed_fh, d) = if let Some((fh, d)) = bits[1].split_once('/') {
        if !mt {
            return Err(Error::Serde("can't have D parameter for XMSS".into()));
        }
        let d: u32 = d
            .parse()
            .map_err(|_| Error::Serde("can't parse D".into()))?;
        (fh, d)
    } else {
        if mt {
            return Err(Error::Serde("missing D parameter".into()));
        }
        (bits[1], 1)
    };

    let full_height: u32 = unparsed_fh
        .parse()
        .map_err(|_| Error::Serde("can't parse full height".into()))?;
    let n_bits: u32 = bits[2]
        .parse()
        .map_err(|_| Error::Serde("can't parse n".into()))?;
    let n = n_bits / 8;

    // The NIST spelling is authoritative for the 192-bit instances; an
    // explicit _RFC suffix selects the legacy interpretation.
    let mut prf = if n == 24 {
        PrfConstruction::Nist
    } else {
        PrfConstruction::Rfc
    };

    let mut wots_w: u16 = 16;
    for bit in &bits[3..] {
        match *bit {
            "NIST" => prf = PrfConstruction::Nist,
            "RFC" => prf = PrfConstruction::Rfc,
            other => {
                let w_str = other.strip_prefix('w').ok_or_else(|| {
                    Error::Serde(
                        "expected 'w[...]', NIST or RFC for fourth or fifth parameter".into(),
                    )
                })?;
                wots_w = w_str
                    .parse()
                    .map_err(|_| Error::Serde("failed to parse WotsW parameter".into()))?;
            }
        }
    }

    Ok(Params {
        func,
        n,
        full_height,
        d,
        wots_w,
        prf,
    })
}

/// Entry in the registry of named algorithms.
pub(crate) struct RegEntry {
    pub name: &'static str,
    /// Whether this is an XMSS^MT instance (as opposed to XMSS).
    pub mt: bool,
    pub oid: u32,
    pub params: Params,
}

const fn p(
    func: HashFunc,
    n: u32,
    full_height: u32,
    d: u32,
    wots_w: u16,
    prf: PrfConstruction,
) -> Params {
    Params {
        func,
        n,
        full_height,
        d,
        wots_w,
        prf,
    }
}

use HashFunc::{Sha2, Shake, Shake256};
use PrfConstruction::{Nist, Rfc};

/// Registry of named XMSS[MT] algorithms.  A process-wide immutable
/// table; OIDs for XMSS and XMSS^MT live in separate namespaces.
pub(crate) static REGISTRY: &[RegEntry] = &[
    // From RFC 8391.
    RegEntry { name: "XMSSMT-SHA2_20/2_256", mt: true, oid: 0x00000001, params: p(Sha2, 32, 20, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_20/4_256", mt: true, oid: 0x00000002, params: p(Sha2, 32, 20, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/2_256", mt: true, oid: 0x00000003, params: p(Sha2, 32, 40, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/4_256", mt: true, oid: 0x00000004, params: p(Sha2, 32, 40, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/8_256", mt: true, oid: 0x00000005, params: p(Sha2, 32, 40, 8, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/3_256", mt: true, oid: 0x00000006, params: p(Sha2, 32, 60, 3, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/6_256", mt: true, oid: 0x00000007, params: p(Sha2, 32, 60, 6, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/12_256", mt: true, oid: 0x00000008, params: p(Sha2, 32, 60, 12, 16, Rfc) },

    RegEntry { name: "XMSSMT-SHA2_20/2_512", mt: true, oid: 0x00000009, params: p(Sha2, 64, 20, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_20/4_512", mt: true, oid: 0x0000000a, params: p(Sha2, 64, 20, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/2_512", mt: true, oid: 0x0000000b, params: p(Sha2, 64, 40, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/4_512", mt: true, oid: 0x0000000c, params: p(Sha2, 64, 40, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_40/8_512", mt: true, oid: 0x0000000d, params: p(Sha2, 64, 40, 8, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/3_512", mt: true, oid: 0x0000000e, params: p(Sha2, 64, 60, 3, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/6_512", mt: true, oid: 0x0000000f, params: p(Sha2, 64, 60, 6, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHA2_60/12_512", mt: true, oid: 0x00000010, params: p(Sha2, 64, 60, 12, 16, Rfc) },

    RegEntry { name: "XMSSMT-SHAKE_20/2_256", mt: true, oid: 0x00000011, params: p(Shake, 32, 20, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_20/4_256", mt: true, oid: 0x00000012, params: p(Shake, 32, 20, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/2_256", mt: true, oid: 0x00000013, params: p(Shake, 32, 40, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/4_256", mt: true, oid: 0x00000014, params: p(Shake, 32, 40, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/8_256", mt: true, oid: 0x00000015, params: p(Shake, 32, 40, 8, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/3_256", mt: true, oid: 0x00000016, params: p(Shake, 32, 60, 3, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/6_256", mt: true, oid: 0x00000017, params: p(Shake, 32, 60, 6, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/12_256", mt: true, oid: 0x00000018, params: p(Shake, 32, 60, 12, 16, Rfc) },

    RegEntry { name: "XMSSMT-SHAKE_20/2_512", mt: true, oid: 0x00000019, params: p(Shake, 64, 20, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_20/4_512", mt: true, oid: 0x0000001a, params: p(Shake, 64, 20, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/2_512", mt: true, oid: 0x0000001b, params: p(Shake, 64, 40, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/4_512", mt: true, oid: 0x0000001c, params: p(Shake, 64, 40, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_40/8_512", mt: true, oid: 0x0000001d, params: p(Shake, 64, 40, 8, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/3_512", mt: true, oid: 0x0000001e, params: p(Shake, 64, 60, 3, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/6_512", mt: true, oid: 0x0000001f, params: p(Shake, 64, 60, 6, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE_60/12_512", mt: true, oid: 0x00000020, params: p(Shake, 64, 60, 12, 16, Rfc) },

    // From NIST SP 800-208.
    RegEntry { name: "XMSSMT-SHA2_20/2_192", mt: true, oid: 0x00000021, params: p(Sha2, 24, 20, 2, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_20/4_192", mt: true, oid: 0x00000022, params: p(Sha2, 24, 20, 4, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_40/2_192", mt: true, oid: 0x00000023, params: p(Sha2, 24, 40, 2, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_40/4_192", mt: true, oid: 0x00000024, params: p(Sha2, 24, 40, 4, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_40/8_192", mt: true, oid: 0x00000025, params: p(Sha2, 24, 40, 8, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_60/3_192", mt: true, oid: 0x00000026, params: p(Sha2, 24, 60, 3, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_60/6_192", mt: true, oid: 0x00000027, params: p(Sha2, 24, 60, 6, 16, Nist) },
    RegEntry { name: "XMSSMT-SHA2_60/12_192", mt: true, oid: 0x00000028, params: p(Sha2, 24, 60, 12, 16, Nist) },

    RegEntry { name: "XMSSMT-SHAKE256_20/2_256", mt: true, oid: 0x00000029, params: p(Shake256, 32, 20, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_20/4_256", mt: true, oid: 0x0000002a, params: p(Shake256, 32, 20, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_40/2_256", mt: true, oid: 0x0000002b, params: p(Shake256, 32, 40, 2, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_40/4_256", mt: true, oid: 0x0000002c, params: p(Shake256, 32, 40, 4, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_40/8_256", mt: true, oid: 0x0000002d, params: p(Shake256, 32, 40, 8, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_60/3_256", mt: true, oid: 0x0000002e, params: p(Shake256, 32, 60, 3, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_60/6_256", mt: true, oid: 0x0000002f, params: p(Shake256, 32, 60, 6, 16, Rfc) },
    RegEntry { name: "XMSSMT-SHAKE256_60/12_256", mt: true, oid: 0x00000030, params: p(Shake256, 32, 60, 12, 16, Rfc) },

    RegEntry { name: "XMSSMT-SHAKE256_20/2_192", mt: true, oid: 0x00000031, params: p(Shake256, 24, 20, 2, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_20/4_192", mt: true, oid: 0x00000032, params: p(Shake256, 24, 20, 4, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_40/2_192", mt: true, oid: 0x00000033, params: p(Shake256, 24, 40, 2, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_40/4_192", mt: true, oid: 0x00000034, params: p(Shake256, 24, 40, 4, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_40/8_192", mt: true, oid: 0x00000035, params: p(Shake256, 24, 40, 8, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_60/3_192", mt: true, oid: 0x00000036, params: p(Shake256, 24, 60, 3, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_60/6_192", mt: true, oid: 0x00000037, params: p(Shake256, 24, 60, 6, 16, Nist) },
    RegEntry { name: "XMSSMT-SHAKE256_60/12_192", mt: true, oid: 0x00000038, params: p(Shake256, 24, 60, 12, 16, Nist) },

    // From RFC 8391.
    RegEntry { name: "XMSS-SHA2_10_256", mt: false, oid: 0x00000001, params: p(Sha2, 32, 10, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHA2_16_256", mt: false, oid: 0x00000002, params: p(Sha2, 32, 16, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHA2_20_256", mt: false, oid: 0x00000003, params: p(Sha2, 32, 20, 1, 16, Rfc) },

    RegEntry { name: "XMSS-SHA2_10_512", mt: false, oid: 0x00000004, params: p(Sha2, 64, 10, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHA2_16_512", mt: false, oid: 0x00000005, params: p(Sha2, 64, 16, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHA2_20_512", mt: false, oid: 0x00000006, params: p(Sha2, 64, 20, 1, 16, Rfc) },

    RegEntry { name: "XMSS-SHAKE_10_256", mt: false, oid: 0x00000007, params: p(Shake, 32, 10, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE_16_256", mt: false, oid: 0x00000008, params: p(Shake, 32, 16, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE_20_256", mt: false, oid: 0x00000009, params: p(Shake, 32, 20, 1, 16, Rfc) },

    RegEntry { name: "XMSS-SHAKE_10_512", mt: false, oid: 0x0000000a, params: p(Shake, 64, 10, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE_16_512", mt: false, oid: 0x0000000b, params: p(Shake, 64, 16, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE_20_512", mt: false, oid: 0x0000000c, params: p(Shake, 64, 20, 1, 16, Rfc) },

    // From NIST SP 800-208.
    RegEntry { name: "XMSS-SHA2_10_192", mt: false, oid: 0x0000000d, params: p(Sha2, 24, 10, 1, 16, Nist) },
    RegEntry { name: "XMSS-SHA2_16_192", mt: false, oid: 0x0000000e, params: p(Sha2, 24, 16, 1, 16, Nist) },
    RegEntry { name: "XMSS-SHA2_20_192", mt: false, oid: 0x0000000f, params: p(Sha2, 24, 20, 1, 16, Nist) },

    RegEntry { name: "XMSS-SHAKE256_10_256", mt: false, oid: 0x00000010, params: p(Shake256, 32, 10, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE256_16_256", mt: false, oid: 0x00000011, params: p(Shake256, 32, 16, 1, 16, Rfc) },
    RegEntry { name: "XMSS-SHAKE256_20_256", mt: false, oid: 0x00000012, params: p(Shake256, 32, 20, 1, 16, Rfc) },

    RegEntry { name: "XMSS-SHAKE256_10_192", mt: false, oid: 0x00000013, params: p(Shake256, 24, 10, 1, 16, Nist) },
    RegEntry { name: "XMSS-SHAKE256_16_192", mt: false, oid: 0x00000014, params: p(Shake256, 24, 16, 1, 16, Nist) },
    RegEntry { name: "XMSS-SHAKE256_20_192", mt: false, oid: 0x00000015, params: p(Shake256, 24, 20, 1, 16, Nist) },
];

/// Lists all named XMSS[MT] instances from RFC 8391 and SP 800-208.
pub fn list_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|entry| entry.name).collect()
}

pub(crate) fn registry_lookup_name(name: &str) -> Option<&'static RegEntry> {
    REGISTRY.iter().find(|entry| entry.name == name)
}

pub(crate) fn registry_lookup_oid(mt: bool, oid: u32) -> Option<&'static RegEntry> {
    REGISTRY
        .iter()
        .find(|entry| entry.mt == mt && entry.oid == oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip_for_every_named_instance() {
        for entry in REGISTRY {
            let header = entry.params.to_header().unwrap();
            let decoded = Params::from_header(&header).unwrap();
            assert_eq!(decoded, entry.params, "{}", entry.name);
        }
    }

    #[test]
    fn header_round_trip_for_unnamed_instances() {
        for &w in &[4u16, 16, 256] {
            for &n in &[16u32, 32, 64] {
                let params = p(Shake, n, 12, 3, w, Rfc);
                let header = params.to_header().unwrap();
                assert_eq!(Params::from_header(&header).unwrap(), params);
            }
        }
    }

    #[test]
    fn header_magic_is_checked() {
        assert!(matches!(
            Params::from_header(&[0x12, 0, 0, 0]),
            Err(Error::Serde(_))
        ));
    }

    #[test]
    fn display_round_trips_through_parse() {
        for entry in REGISTRY {
            let shown = entry.params.to_string();
            assert_eq!(shown, entry.name);
            assert_eq!(Params::parse(&shown).unwrap(), entry.params, "{}", shown);
        }
        // Unnamed instances round-trip through the grammar.
        for params in [
            p(Shake, 32, 10, 5, 4, Rfc),
            p(Sha2, 16, 12, 3, 256, Rfc),
            p(Sha2, 24, 20, 2, 16, Rfc),
            p(Shake256, 32, 20, 2, 4, Nist),
        ] {
            let shown = params.to_string();
            assert_eq!(Params::parse(&shown).unwrap(), params, "{}", shown);
        }
    }

    #[test]
    fn parse_defaults_match_the_standards() {
        // w defaults to 16, the 192-bit instances default to the NIST
        // PRF construction and everything else to the RFC one.
        let params = Params::parse("XMSSMT-SHA2_60/12_256").unwrap();
        assert_eq!(params.wots_w, 16);
        assert_eq!(params.prf, PrfConstruction::Rfc);

        let params = Params::parse("XMSS-SHA2_10_192").unwrap();
        assert_eq!(params.prf, PrfConstruction::Nist);

        let params = Params::parse("XMSS-SHA2_10_192_RFC").unwrap();
        assert_eq!(params.prf, PrfConstruction::Rfc);
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for name in [
            "XMS-SHA2_10_256",
            "XMSS_SHA2_10_256",
            "XMSS-MD5_10_256",
            "XMSS-SHA2_10/2_256",
            "XMSSMT-SHA2_10_256",
            "XMSS-SHA2_10_256_x16",
            "XMSS-SHA2_10",
        ] {
            assert!(Params::parse(name).is_err(), "{} should not parse", name);
        }
    }

    #[test]
    fn derived_quantities() {
        let params = Params::from_name("XMSS-SHA2_10_256").unwrap();
        assert_eq!(params.wots_log_w(), 4);
        assert_eq!(params.wots_len1(), 64);
        assert_eq!(params.wots_len2(), 3);
        assert_eq!(params.wots_len(), 67);
        assert_eq!(params.wots_signature_size(), 67 * 32);
        assert_eq!(params.max_signature_seq_no(), 1023);
        assert_eq!(params.private_key_size(), 96);
        // height 10/1 + 1 = 11 levels
        assert_eq!(params.bare_subtree_size(), ((1 << 11) - 1) * 32);
        assert_eq!(
            params.cached_subtree_size(),
            params.bare_subtree_size() + 67 * 32 + 8
        );
    }

    #[test]
    fn registry_oid_namespaces_are_disjoint() {
        assert!(registry_lookup_oid(false, 0x01).is_some());
        assert!(registry_lookup_oid(true, 0x01).is_some());
        assert_ne!(
            registry_lookup_oid(false, 0x01).unwrap().name,
            registry_lookup_oid(true, 0x01).unwrap().name,
        );
        assert!(registry_lookup_name("XMSSMT-SHA2_60/12_256").is_some());
        assert_eq!(list_names().len(), REGISTRY.len());
    }
}
