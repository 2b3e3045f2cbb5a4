//! # vmprep-testing
//!
//! Fixtures shared by the vmprep test suites:
//!
//! - [`Qcow2Builder`]: writes small, valid qcow2 images with chosen clusters
//! - [`write_stub_executable`]: shell-script stand-ins for helper binaries
//! - deterministic pseudo-random file content and SHA-256 helpers

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

pub const MIB: u64 = 1024 * 1024;

const QCOW2_MAGIC: u32 = 0x5146_49fb;
const OFLAG_COPIED: u64 = 1 << 63;
const OFLAG_COMPRESSED: u64 = 1 << 62;
const OFLAG_ZERO: u64 = 1;

/// Contents of one guest cluster in a synthetic qcow2 image.
#[derive(Debug, Clone)]
pub enum ClusterContent {
    /// Stored uncompressed. Shorter payloads are zero padded.
    Data(Vec<u8>),
    /// Stored deflate-compressed.
    Compressed(Vec<u8>),
    /// Marked with the v3 zero flag.
    Zero,
}

/// Builds qcow2 images cluster by cluster.
#[derive(Debug, Clone)]
pub struct Qcow2Builder {
    version: u32,
    cluster_bits: u32,
    virtual_size: u64,
    clusters: Vec<(u64, ClusterContent)>,
    backing_file: Option<String>,
    incompatible_features: u64,
    crypt_method: u32,
    l1_size_override: Option<u32>,
}

impl Qcow2Builder {
    /// A version 3 image with 64 KiB clusters.
    pub fn new(virtual_size: u64) -> Self {
        Self {
            version: 3,
            cluster_bits: 16,
            virtual_size,
            clusters: Vec::new(),
            backing_file: None,
            incompatible_features: 0,
            crypt_method: 0,
            l1_size_override: None,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn cluster_bits(mut self, bits: u32) -> Self {
        self.cluster_bits = bits;
        self
    }

    pub fn cluster_size(&self) -> u64 {
        1 << self.cluster_bits
    }

    /// Set the content of the guest cluster containing `guest_offset`.
    pub fn cluster(mut self, guest_offset: u64, content: ClusterContent) -> Self {
        let index = guest_offset >> self.cluster_bits;
        self.clusters.retain(|(i, _)| *i != index);
        self.clusters.push((index, content));
        self
    }

    pub fn backing_file(mut self, name: impl Into<String>) -> Self {
        self.backing_file = Some(name.into());
        self
    }

    pub fn incompatible_features(mut self, bits: u64) -> Self {
        self.incompatible_features = bits;
        self
    }

    pub fn crypt_method(mut self, method: u32) -> Self {
        self.crypt_method = method;
        self
    }

    /// Force an L1 table size, e.g. one too small for the virtual size.
    pub fn l1_size(mut self, entries: u32) -> Self {
        self.l1_size_override = Some(entries);
        self
    }

    /// Write the image to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        let cluster_size = self.cluster_size();
        let l2_entries = cluster_size / 8;
        let guest_clusters = self.virtual_size.div_ceil(cluster_size);
        let l1_size = self
            .l1_size_override
            .map(u64::from)
            .unwrap_or_else(|| guest_clusters.div_ceil(l2_entries).max(1));
        let l1_clusters = (l1_size * 8).div_ceil(cluster_size).max(1);

        // cluster 0: header; then L1 table; then one refcount table cluster
        let l1_offset = cluster_size;
        let refcount_offset = l1_offset + l1_clusters * cluster_size;
        let mut next_free = refcount_offset + cluster_size;

        let mut file = File::create(path)?;
        let mut l1 = vec![0u64; l1_size as usize];
        let mut l2_tables: Vec<(u64, Vec<u64>)> = Vec::new();

        let mut clusters = self.clusters.clone();
        clusters.sort_by_key(|(i, _)| *i);

        for (index, content) in &clusters {
            let l1_index = (index / l2_entries) as usize;
            let l2_index = (index % l2_entries) as usize;

            if l1[l1_index] == 0 {
                l1[l1_index] = next_free | OFLAG_COPIED;
                l2_tables.push((next_free, vec![0u64; l2_entries as usize]));
                next_free += cluster_size;
            }
            let l2_offset = l1[l1_index] & !OFLAG_COPIED;
            let table = l2_tables
                .iter_mut()
                .find(|(offset, _)| *offset == l2_offset)
                .map(|(_, table)| table)
                .ok_or_else(|| io::Error::other("missing L2 table"))?;

            match content {
                ClusterContent::Data(payload) => {
                    let mut data = payload.clone();
                    data.resize(cluster_size as usize, 0);
                    write_at(&mut file, next_free, &data)?;
                    table[l2_index] = next_free | OFLAG_COPIED;
                    next_free += cluster_size;
                }
                ClusterContent::Compressed(payload) => {
                    let mut data = payload.clone();
                    data.resize(cluster_size as usize, 0);
                    let compressed = deflate(&data)?;
                    if compressed.len() as u64 > cluster_size {
                        return Err(io::Error::other("payload does not compress"));
                    }
                    write_at(&mut file, next_free, &compressed)?;
                    let csize_shift = 62 - (self.cluster_bits - 8);
                    let nb_csectors = ((next_free + compressed.len() as u64 - 1) >> 9)
                        - (next_free >> 9);
                    table[l2_index] = next_free | OFLAG_COMPRESSED | (nb_csectors << csize_shift);
                    next_free += cluster_size;
                }
                ClusterContent::Zero => {
                    table[l2_index] = OFLAG_ZERO;
                }
            }
        }

        for (offset, table) in &l2_tables {
            write_at(&mut file, *offset, &be_table(table))?;
        }
        write_at(&mut file, l1_offset, &be_table(&l1))?;
        write_at(&mut file, refcount_offset, &vec![0u8; cluster_size as usize])?;

        let header_length: u64 = if self.version >= 3 { 104 } else { 72 };
        let (backing_offset, backing_size) = match &self.backing_file {
            Some(name) => {
                // after the header extension end marker
                let offset = header_length + 8;
                write_at(&mut file, offset, name.as_bytes())?;
                (offset, name.len() as u32)
            }
            None => (0, 0),
        };

        let mut header = Vec::with_capacity(header_length as usize + 8);
        header.extend_from_slice(&QCOW2_MAGIC.to_be_bytes());
        header.extend_from_slice(&self.version.to_be_bytes());
        header.extend_from_slice(&backing_offset.to_be_bytes());
        header.extend_from_slice(&backing_size.to_be_bytes());
        header.extend_from_slice(&self.cluster_bits.to_be_bytes());
        header.extend_from_slice(&self.virtual_size.to_be_bytes());
        header.extend_from_slice(&self.crypt_method.to_be_bytes());
        header.extend_from_slice(&(l1_size as u32).to_be_bytes());
        header.extend_from_slice(&l1_offset.to_be_bytes());
        header.extend_from_slice(&refcount_offset.to_be_bytes());
        header.extend_from_slice(&1u32.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes());
        header.extend_from_slice(&0u64.to_be_bytes());
        if self.version >= 3 {
            header.extend_from_slice(&self.incompatible_features.to_be_bytes());
            header.extend_from_slice(&0u64.to_be_bytes());
            header.extend_from_slice(&0u64.to_be_bytes());
            header.extend_from_slice(&4u32.to_be_bytes());
            header.extend_from_slice(&(header_length as u32).to_be_bytes());
            // header extension end marker
            header.extend_from_slice(&[0u8; 8]);
        }
        write_at(&mut file, 0, &header)?;

        let len = file.metadata()?.len();
        if len < next_free {
            file.set_len(next_free)?;
        }
        file.sync_all()
    }
}

fn write_at(file: &mut File, offset: u64, data: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}

fn be_table(entries: &[u64]) -> Vec<u8> {
    entries.iter().flat_map(|e| e.to_be_bytes()).collect()
}

fn deflate(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Write an executable `#!/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_stub_executable(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write stub executable");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub executable");
    path
}

/// Deterministic xorshift byte stream.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let bytes = state.to_le_bytes();
        let take = (len - out.len()).min(bytes.len());
        out.extend_from_slice(&bytes[..take]);
    }
    out
}

/// Write `len` pseudo-random bytes to `path`.
pub fn write_pseudo_random_file(path: &Path, len: usize, seed: u64) -> io::Result<()> {
    fs::write(path, pseudo_random_bytes(len, seed))
}

/// Hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; MIB as usize];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// True when every byte of `path` in `[start, end)` is zero.
pub fn range_is_zero(path: &Path, start: u64, end: u64) -> io::Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let mut remaining = end - start;
    let mut buf = vec![0u8; MIB as usize];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        file.read_exact(&mut buf[..want])?;
        if buf[..want].iter().any(|&b| b != 0) {
            return Ok(false);
        }
        remaining -= want as u64;
    }
    Ok(true)
}

/// Read `len` bytes of `path` starting at `offset`.
pub fn read_range(path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}
