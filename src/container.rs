//! The persistent private-key container.
//!
//! Three artefacts live under a user-chosen base path:
//!
//! ```text
//!   path/to/key        secret key, parameters and signature seqno
//!   path/to/key.lock   lockfile guarding against other processes
//!   path/to/key.cache  cached subtrees, mmap'd
//! ```
//!
//! The key file is only ever replaced atomically: a new copy is written
//! to a sibling `.tmp` file, fsynced, renamed over the key file, and
//! the parent directory is fsynced.  The on-disk sequence number is
//! therefore always at least as large as any sequence number handed out
//! for signing, even across crashes.
//!
//! Cached subtrees occupy 4096-byte-aligned records so each can be
//! mapped individually.  A record ends in an xxhash64 checksum over its
//! body; the checksum is verified before the first use of a cached
//! subtree in a process lifetime.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::{File, OpenOptions};
use std::hash::Hasher;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use log::debug;
use memmap2::{MmapMut, MmapOptions};
use twox_hash::XxHash64;
use zeroize::Zeroizing;

use crate::address::SubTreeAddress;
use crate::error::{Error, Result};
use crate::params::Params;
use crate::utils::{get_u32_at, get_u64_at, set_u32_at, set_u64_at};

/// First 8 bytes of the key file.
pub(crate) const KEY_MAGIC: [u8; 8] = [0x40, 0x89, 0x43, 0x0a, 0x5c, 0xed, 0x68, 0x44];
/// First 8 bytes of the subtree cache file.
pub(crate) const CACHE_MAGIC: [u8; 8] = [0xe7, 0x79, 0x57, 0x60, 0x7e, 0xf7, 0x94, 0x46];

/// magic ‖ params header ‖ seqno ‖ borrowed
const KEY_HEADER_BYTES: usize = 8 + 4 + 8 + 4;
/// magic ‖ allocated
const CACHE_HEADER_BYTES: usize = 8 + 4;
/// allocated flag ‖ layer ‖ tree
const SUBTREE_HEADER_BYTES: usize = 13;
const RECORD_ALIGN: usize = 4096;

/// A borrowed view of one mmap'd subtree record body (tree nodes, the
/// WOTS+ signature slot and the trailing checksum).
///
/// The pointer stays valid until the record is dropped from the cache
/// or the container is closed; the subtree state machine of the
/// `PrivateKey` guarantees neither happens while a signer still holds a
/// slot, and that at most one thread writes to a slot before it is
/// published.
#[derive(Clone, Copy)]
pub(crate) struct SubTreeSlot {
    ptr: *mut u8,
    len: usize,
}

unsafe impl Send for SubTreeSlot {}
unsafe impl Sync for SubTreeSlot {}

impl SubTreeSlot {
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// # Safety
    ///
    /// The caller must be the only thread accessing the slot, which the
    /// subtree resolver guarantees during materialisation.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr, self.len)
    }

    /// Whether the stored bytes satisfy
    /// `xxhash64(body) == checksum_suffix`.
    pub fn verify_checksum(&self) -> bool {
        let bytes = self.bytes();
        let body = &bytes[..self.len - 8];
        xxhash64(body) == get_u64_at(bytes, self.len - 8)
    }

    /// Recomputes the trailing checksum from the body.
    ///
    /// # Safety
    ///
    /// Same contract as [`SubTreeSlot::bytes_mut`].
    pub unsafe fn update_checksum(&self) {
        let bytes = self.bytes_mut();
        let sum = xxhash64(&bytes[..self.len - 8]);
        set_u64_at(bytes, sum, self.len - 8);
    }
}

fn xxhash64(data: &[u8]) -> u64 {
    let mut h = XxHash64::with_seed(0);
    h.write(data);
    h.finish()
}

/// Private-key container backed by the filesystem.
pub(crate) struct FsContainer {
    path: PathBuf,
    lock_path: PathBuf,
    _lock_file: Option<File>,
    initialized: bool,
    cache_initialized: bool,
    closed: bool,

    params: Option<Params>,
    private_key: Zeroizing<Vec<u8>>,
    seq_no: u64,
    borrowed: u32,

    cache_file: Option<File>,
    allocated_subtrees: u32,
    cache_idx: HashMap<SubTreeAddress, u32>,
    cache_maps: HashMap<SubTreeAddress, MmapMut>,
    cache_free_idx: BinaryHeap<Reverse<u32>>,
}

impl FsContainer {
    /// Opens (or prepares to create) the container at `path`, taking
    /// the process lock.
    pub fn open(path: &Path) -> Result<FsContainer> {
        let path = std::path::absolute(path)?;
        let lock_path = with_suffix(&path, ".lock");

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)?;
        if let Err(err) = lock_file.try_lock_exclusive() {
            if err.kind() == fs2::lock_contended_error().kind() {
                return Err(Error::Locked(path));
            }
            return Err(err.into());
        }

        let mut ctr = FsContainer {
            path,
            lock_path,
            _lock_file: Some(lock_file),
            initialized: false,
            cache_initialized: false,
            closed: false,
            params: None,
            private_key: Zeroizing::new(Vec::new()),
            seq_no: 0,
            borrowed: 0,
            cache_file: None,
            allocated_subtrees: 0,
            cache_idx: HashMap::new(),
            cache_maps: HashMap::new(),
            cache_free_idx: BinaryHeap::new(),
        };

        let mut file = match File::open(&ctr.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ctr),
            Err(err) => return Err(err.into()),
        };

        let mut header = [0u8; KEY_HEADER_BYTES];
        file.read_exact(&mut header)?;
        if header[..8] != KEY_MAGIC {
            return Err(Error::Serde("key file has invalid magic".into()));
        }
        let params = Params::from_header(&header[8..12])?;
        ctr.seq_no = get_u64_at(&header, 12);
        ctr.borrowed = get_u32_at(&header, 20);

        let mut private_key = Zeroizing::new(vec![0u8; params.private_key_size()]);
        file.read_exact(&mut private_key)?;
        ctr.private_key = private_key;
        ctr.params = Some(params);
        ctr.initialized = true;

        ctr.open_cache()?;
        Ok(ctr)
    }

    fn open_cache(&mut self) -> Result<()> {
        self.cache_idx.clear();
        self.cache_maps.clear();
        self.cache_free_idx.clear();

        let cache_path = with_suffix(&self.path, ".cache");
        let mut file = match OpenOptions::new().read(true).write(true).open(&cache_path) {
            Ok(file) => file,
            // A missing cache is not fatal; it is rebuilt on load.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut header = [0u8; CACHE_HEADER_BYTES];
        file.read_exact(&mut header)?;
        if header[..8] != CACHE_MAGIC {
            return Err(Error::Serde("cache file magic is wrong".into()));
        }
        self.allocated_subtrees = get_u32_at(&header, 8);

        for idx in 0..self.allocated_subtrees {
            file.seek(SeekFrom::Start(self.subtree_offset(idx) as u64))?;
            let mut tree_header = [0u8; SUBTREE_HEADER_BYTES];
            file.read_exact(&mut tree_header)?;
            if tree_header[0] == 0 {
                self.cache_free_idx.push(Reverse(idx));
            } else {
                let sta = SubTreeAddress {
                    layer: get_u32_at(&tree_header, 1),
                    tree: get_u64_at(&tree_header, 5),
                };
                self.cache_idx.insert(sta, idx);
            }
        }

        self.cache_file = Some(file);
        self.cache_initialized = true;
        Ok(())
    }

    /// The algorithm parameters if the container is initialized (the
    /// key file exists) and `None` if not.
    pub fn initialized(&self) -> Option<Params> {
        if self.initialized {
            self.params
        } else {
            None
        }
    }

    /// Whether the subtree cache is initialized.  If not, it can be
    /// (re)built by calling [`FsContainer::reset_cache`].
    pub fn cache_initialized(&self) -> bool {
        self.cache_initialized
    }

    /// Resets (or initializes) the container with the given private key
    /// and parameters and an empty cache.
    pub fn reset(&mut self, private_key: &[u8], params: Params) -> Result<()> {
        if self.closed {
            return Err(Error::Io(std::io::Error::other("container is closed")));
        }
        self.drop_cache_state();
        self.params = Some(params);
        self.private_key = Zeroizing::new(private_key.to_vec());
        self.seq_no = 0;
        self.borrowed = 0;
        self.cache_initialized = false;
        self.write_key_file()?;
        self.initialized = true;
        self.reset_cache()
    }

    /// Resets (or initializes) the subtree cache.
    pub fn reset_cache(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::Io(std::io::Error::other(
                "container is not initialized",
            )));
        }
        self.drop_cache_state();

        let cache_path = with_suffix(&self.path, ".cache");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(cache_path)?;
        self.cache_file = Some(file);
        self.allocated_subtrees = 0;
        self.write_cache_header()?;
        self.cache_initialized = true;
        Ok(())
    }

    fn drop_cache_state(&mut self) {
        self.cache_maps.clear();
        self.cache_idx.clear();
        self.cache_free_idx.clear();
        self.allocated_subtrees = 0;
        self.cache_file = None;
        self.cache_initialized = false;
    }

    fn write_cache_header(&mut self) -> Result<()> {
        let Some(file) = self.cache_file.as_mut() else {
            return Err(Error::Io(std::io::Error::other("cache file is not open")));
        };
        let mut header = [0u8; CACHE_HEADER_BYTES];
        header[..8].copy_from_slice(&CACHE_MAGIC);
        set_u32_at(&mut header, self.allocated_subtrees, 8);
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        Ok(())
    }

    /// Offset of the given record in the cache file, pointing at the
    /// 13-byte header just in front of the record body.
    fn subtree_offset(&self, idx: u32) -> usize {
        let record = self.record_size();
        idx as usize * record + RECORD_ALIGN
    }

    fn record_size(&self) -> usize {
        let params = self.params.as_ref().map(|p| p.cached_subtree_size()).unwrap_or(0);
        // smallest multiple of 4096 above body + header
        ((params + SUBTREE_HEADER_BYTES - 1) & !(RECORD_ALIGN - 1)) + RECORD_ALIGN
    }

    fn mmap_subtree(&mut self, sta: SubTreeAddress, idx: u32) -> Result<SubTreeSlot> {
        let Some(params) = self.params else {
            return Err(Error::Io(std::io::Error::other(
                "container is not initialized",
            )));
        };
        let Some(file) = self.cache_file.as_ref() else {
            return Err(Error::Io(std::io::Error::other("cache file is not open")));
        };
        let len = SUBTREE_HEADER_BYTES + params.cached_subtree_size();
        let mut map = unsafe {
            MmapOptions::new()
                .offset(self.subtree_offset(idx) as u64)
                .len(len)
                .map_mut(file)?
        };
        let slot = SubTreeSlot {
            ptr: map.as_mut_ptr().wrapping_add(SUBTREE_HEADER_BYTES),
            len: params.cached_subtree_size(),
        };
        self.cache_maps.insert(sta, map);
        Ok(slot)
    }

    /// Returns the mmap'd record body for the given subtree address.
    ///
    /// The first call for an address allocates a record, writes its
    /// header and returns a zeroed body with `exists = false`; later
    /// calls return the same buffer with `exists = true`.
    pub fn get_sub_tree(&mut self, sta: SubTreeAddress) -> Result<(SubTreeSlot, bool)> {
        if !self.cache_initialized {
            return Err(Error::Io(std::io::Error::other(
                "cache is not initialized",
            )));
        }

        if let Some(map) = self.cache_maps.get_mut(&sta) {
            let len = map.len() - SUBTREE_HEADER_BYTES;
            let slot = SubTreeSlot {
                ptr: map.as_mut_ptr().wrapping_add(SUBTREE_HEADER_BYTES),
                len,
            };
            return Ok((slot, true));
        }

        if let Some(&idx) = self.cache_idx.get(&sta) {
            return Ok((self.mmap_subtree(sta, idx)?, true));
        }

        // Allocate a record: reuse a dropped one or grow the file.
        let reused;
        let idx = match self.cache_free_idx.pop() {
            Some(Reverse(idx)) => {
                reused = true;
                idx
            }
            None => {
                reused = false;
                let idx = self.allocated_subtrees;
                self.allocated_subtrees += 1;
                let end = self.subtree_offset(self.allocated_subtrees);
                let Some(file) = self.cache_file.as_ref() else {
                    return Err(Error::Io(std::io::Error::other("cache file is not open")));
                };
                file.set_len(end as u64)?;
                self.write_cache_header()?;
                idx
            }
        };

        let slot = self.mmap_subtree(sta, idx)?;
        self.cache_idx.insert(sta, idx);
        if let Some(map) = self.cache_maps.get_mut(&sta) {
            if reused {
                map[SUBTREE_HEADER_BYTES..].fill(0);
            }
            map[0] = 1;
            set_u32_at(map, sta.layer, 1);
            set_u64_at(map, sta.tree, 5);
        }
        Ok((slot, false))
    }

    /// The addresses of all cached subtrees.
    pub fn list_sub_trees(&self) -> Vec<SubTreeAddress> {
        self.cache_idx.keys().copied().collect()
    }

    /// Drops the given subtree from the cache (if it was even cached to
    /// begin with), releasing its record for reuse.
    pub fn drop_sub_tree(&mut self, sta: SubTreeAddress) -> Result<()> {
        if !self.cache_initialized {
            return Err(Error::Io(std::io::Error::other(
                "cache is not initialized",
            )));
        }
        let Some(idx) = self.cache_idx.remove(&sta) else {
            return Ok(());
        };
        debug!("dropping cached subtree layer={} tree={}", sta.layer, sta.tree);
        if self.cache_maps.get(&sta).is_none() {
            self.mmap_subtree(sta, idx)?;
        }
        if let Some(mut map) = self.cache_maps.remove(&sta) {
            map[0] = 0;
        }
        self.cache_free_idx.push(Reverse(idx));
        Ok(())
    }

    /// Returns the current sequence number and advances the stored one
    /// by `amount`.  The caller may use the sequence numbers in this
    /// range freely but must call [`FsContainer::set_seq_no`] later to
    /// record how many were actually used.
    pub fn borrow_seq_nos(&mut self, amount: u32) -> Result<u64> {
        if !self.initialized {
            return Err(Error::Io(std::io::Error::other(
                "container is not initialized",
            )));
        }
        self.borrowed += amount;
        self.seq_no += u64::from(amount);
        if let Err(err) = self.write_key_file() {
            self.borrowed -= amount;
            self.seq_no -= u64::from(amount);
            return Err(err);
        }
        Ok(self.seq_no - u64::from(amount))
    }

    /// Durably sets the sequence number, clearing the
    /// possibly-lost-signatures record left by
    /// [`FsContainer::borrow_seq_nos`].
    pub fn set_seq_no(&mut self, seq_no: u64) -> Result<()> {
        if !self.initialized {
            return Err(Error::Io(std::io::Error::other(
                "container is not initialized",
            )));
        }
        let old_borrowed = self.borrowed;
        let old_seq_no = self.seq_no;
        self.borrowed = 0;
        self.seq_no = seq_no;
        if let Err(err) = self.write_key_file() {
            self.borrowed = old_borrowed;
            self.seq_no = old_seq_no;
            return Err(err);
        }
        Ok(())
    }

    /// The stored sequence number and the number of signatures that may
    /// have been lost: if sequence numbers were borrowed and never
    /// returned by a [`FsContainer::set_seq_no`], a crash ended the
    /// previous lifetime and up to `borrowed` signatures were emitted
    /// without a trace.
    pub fn seq_no(&self) -> (u64, u32) {
        (self.seq_no, self.borrowed)
    }

    /// The stored private key: skSeed ‖ skPrf ‖ pubSeed.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    /// Writes the key file to disk: (1) write a sibling tmp file,
    /// (2) fsync it, (3) rename it over the key file, (4) fsync the
    /// parent directory.  If step 4 fails there is no way of knowing
    /// whether the rename survived, so the error is fatal and the
    /// caller must assume the old state.
    fn write_key_file(&mut self) -> Result<()> {
        let Some(params) = self.params else {
            return Err(Error::Io(std::io::Error::other(
                "container has no parameters",
            )));
        };
        let tmp_path = with_suffix(&self.path, ".tmp");
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut header = [0u8; KEY_HEADER_BYTES];
        header[..8].copy_from_slice(&KEY_MAGIC);
        params.write_into(&mut header[8..12])?;
        set_u64_at(&mut header, self.seq_no, 12);
        set_u32_at(&mut header, self.borrowed, 20);
        tmp.write_all(&header)?;
        tmp.write_all(&self.private_key)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;

        let dir = self.path.parent().unwrap_or(Path::new("."));
        File::open(dir)?.sync_all()?;
        Ok(())
    }

    /// Closes the container: unmaps the cache and releases the lock.
    pub fn close(&mut self) -> Result<()> {
        self.drop_cache_state();
        if let Some(lock) = self._lock_file.take() {
            let _ = fs2::FileExt::unlock(&lock);
            let _ = std::fs::remove_file(&self.lock_path);
        }
        self.closed = true;
        self.initialized = false;
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
