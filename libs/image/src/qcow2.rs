//! Read-only qcow2 access.
//!
//! Guest offsets map through a two-level table: the L1 table points at L2
//! tables, each L2 entry points at one data cluster. Only one L2 table and
//! one decompressed cluster are held in memory at a time, so reading is
//! bounded regardless of virtual size.
//!
//! Supported: versions 2 and 3, deflate-compressed clusters, the v3 zero
//! flag, and backing files (raw or qcow2). Encrypted images, external data
//! files, extended L2 entries, and zstd compression are rejected.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use flate2::read::DeflateDecoder;
use tracing::debug;

use crate::format::{self, ContainerFormat};
use crate::ConversionError;

const QCOW2_MAGIC: u32 = 0x5146_49fb;
const V2_HEADER_LEN: usize = 72;
const V3_HEADER_LEN: usize = 104;

const MIN_CLUSTER_BITS: u32 = 9;
const MAX_CLUSTER_BITS: u32 = 21;

/// Host offset bits of L1 and standard L2 entries.
const OFFSET_MASK: u64 = 0x00ff_ffff_ffff_fe00;
const OFLAG_COMPRESSED: u64 = 1 << 62;
const OFLAG_ZERO: u64 = 1;

const INCOMPAT_DIRTY: u64 = 1 << 0;
const INCOMPAT_CORRUPT: u64 = 1 << 1;
const INCOMPAT_DATA_FILE: u64 = 1 << 2;
const INCOMPAT_COMPRESSION: u64 = 1 << 3;
const INCOMPAT_EXTL2: u64 = 1 << 4;
const INCOMPAT_KNOWN: u64 =
    INCOMPAT_DIRTY | INCOMPAT_CORRUPT | INCOMPAT_DATA_FILE | INCOMPAT_COMPRESSION | INCOMPAT_EXTL2;

const MAX_BACKING_FILE_NAME: u32 = 1023;

/// Longest backing chain followed.
pub const MAX_BACKING_DEPTH: usize = 16;

/// Parsed qcow2 header fields used for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qcow2Header {
    pub version: u32,
    pub backing_file_offset: u64,
    pub backing_file_size: u32,
    pub cluster_bits: u32,
    /// Virtual disk size in bytes.
    pub size: u64,
    pub crypt_method: u32,
    pub l1_size: u32,
    pub l1_table_offset: u64,
    pub incompatible_features: u64,
    pub header_length: u32,
    pub compression_type: u8,
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(bytes)
}

fn be_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(bytes)
}

impl Qcow2Header {
    /// Parse a header from the first bytes of the file.
    pub fn parse(buf: &[u8]) -> Result<Self, ConversionError> {
        if buf.len() < V2_HEADER_LEN {
            return Err(ConversionError::unreadable("qcow2 header is truncated"));
        }
        if be_u32(buf, 0) != QCOW2_MAGIC {
            return Err(ConversionError::unreadable("missing qcow2 magic"));
        }

        let version = be_u32(buf, 4);
        if version != 2 && version != 3 {
            return Err(ConversionError::unreadable(format!(
                "unsupported qcow2 version {version}"
            )));
        }

        let mut header = Self {
            version,
            backing_file_offset: be_u64(buf, 8),
            backing_file_size: be_u32(buf, 16),
            cluster_bits: be_u32(buf, 20),
            size: be_u64(buf, 24),
            crypt_method: be_u32(buf, 32),
            l1_size: be_u32(buf, 36),
            l1_table_offset: be_u64(buf, 40),
            incompatible_features: 0,
            header_length: V2_HEADER_LEN as u32,
            compression_type: 0,
        };

        if version >= 3 {
            if buf.len() < V3_HEADER_LEN {
                return Err(ConversionError::unreadable("qcow2 v3 header is truncated"));
            }
            header.incompatible_features = be_u64(buf, 72);
            header.header_length = be_u32(buf, 100);
            if header.header_length as usize > V3_HEADER_LEN && buf.len() > V3_HEADER_LEN {
                header.compression_type = buf[V3_HEADER_LEN];
            }
        }

        Ok(header)
    }

    pub fn cluster_size(&self) -> u64 {
        1 << self.cluster_bits
    }

    /// Entries per L2 table.
    pub fn l2_entries(&self) -> u64 {
        self.cluster_size() / 8
    }

    /// Reject images this reader cannot read faithfully.
    pub fn check_readable(&self) -> Result<(), ConversionError> {
        if !(MIN_CLUSTER_BITS..=MAX_CLUSTER_BITS).contains(&self.cluster_bits) {
            return Err(ConversionError::unreadable(format!(
                "invalid cluster size 2^{}",
                self.cluster_bits
            )));
        }
        if self.crypt_method != 0 {
            return Err(ConversionError::unreadable("encrypted images are not supported"));
        }

        let features = self.incompatible_features;
        if features & INCOMPAT_CORRUPT != 0 {
            return Err(ConversionError::unreadable("image is marked corrupt"));
        }
        if features & INCOMPAT_DATA_FILE != 0 {
            return Err(ConversionError::unreadable("external data files are not supported"));
        }
        if features & INCOMPAT_EXTL2 != 0 {
            return Err(ConversionError::unreadable("extended L2 entries are not supported"));
        }
        if features & !INCOMPAT_KNOWN != 0 {
            return Err(ConversionError::unreadable(format!(
                "unknown incompatible features {:#x}",
                features & !INCOMPAT_KNOWN
            )));
        }
        if self.compression_type != 0 {
            return Err(ConversionError::unreadable(format!(
                "compression type {} is not supported",
                self.compression_type
            )));
        }

        let covered = u128::from(self.l1_size)
            * u128::from(self.l2_entries())
            * u128::from(self.cluster_size());
        if covered < u128::from(self.size) {
            return Err(ConversionError::unreadable(format!(
                "L1 table of {} entries is too small for virtual size {}",
                self.l1_size, self.size
            )));
        }
        if self.l1_size > 0 && self.l1_table_offset % self.cluster_size() != 0 {
            return Err(ConversionError::unreadable("L1 table is not cluster aligned"));
        }
        if self.backing_file_offset != 0 && self.backing_file_size > MAX_BACKING_FILE_NAME {
            return Err(ConversionError::unreadable("backing file name is too long"));
        }

        Ok(())
    }
}

/// Where one guest cluster's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cluster {
    Unallocated,
    Zero,
    Data(u64),
    Compressed { offset: u64, size: u64 },
}

/// A disk image usable as a read source.
pub enum DiskImage {
    Raw(RawImage),
    Qcow2(Box<Qcow2Image>),
}

impl DiskImage {
    /// Open `path`, detecting its format.
    pub fn open(path: &Path) -> Result<Self, ConversionError> {
        Self::open_at_depth(path, 0)
    }

    fn open_at_depth(path: &Path, depth: usize) -> Result<Self, ConversionError> {
        let mut file = File::open(path).map_err(|e| {
            ConversionError::unreadable(format!("cannot open {}: {e}", path.display()))
        })?;
        let detected =
            format::sniff(&mut file).map_err(|source| ConversionError::Read { offset: 0, source })?;

        match detected {
            ContainerFormat::Raw => Ok(DiskImage::Raw(RawImage::new(file)?)),
            ContainerFormat::Qcow2 => Ok(DiskImage::Qcow2(Box::new(Qcow2Image::open_at_depth(
                file, path, depth,
            )?))),
            other => Err(ConversionError::unreadable(format!(
                "{} is a {other} image",
                path.display()
            ))),
        }
    }

    pub fn virtual_size(&self) -> u64 {
        match self {
            DiskImage::Raw(raw) => raw.len,
            DiskImage::Qcow2(qcow2) => qcow2.header.size,
        }
    }

    /// Fill `buf` with guest data at `offset`. Returns false when the whole
    /// range is known to be zero without reading data.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<bool, ConversionError> {
        match self {
            DiskImage::Raw(raw) => raw.read_at(offset, buf),
            DiskImage::Qcow2(qcow2) => qcow2.read_at(offset, buf),
        }
    }
}

/// A flat image; reads past the end are zero.
pub struct RawImage {
    file: File,
    len: u64,
}

impl RawImage {
    fn new(file: File) -> Result<Self, ConversionError> {
        let len = file
            .metadata()
            .map_err(|source| ConversionError::Read { offset: 0, source })?
            .len();
        Ok(Self { file, len })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<bool, ConversionError> {
        if offset >= self.len {
            buf.fill(0);
            return Ok(false);
        }
        let available = (self.len - offset).min(buf.len() as u64) as usize;
        read_exact_at(&mut self.file, offset, &mut buf[..available])?;
        buf[available..].fill(0);
        Ok(true)
    }
}

/// An open qcow2 image.
pub struct Qcow2Image {
    file: File,
    header: Qcow2Header,
    backing: Option<DiskImage>,
    l1_cache: Option<(u64, u64)>,
    l2_cache: Option<(u64, Vec<u64>)>,
    l2_raw: Vec<u8>,
    compressed: Vec<u8>,
    decompressed: Vec<u8>,
    decompressed_from: Option<u64>,
}

impl Qcow2Image {
    /// Open a qcow2 image from a read-only handle. `path` locates relative
    /// backing files.
    pub fn open(file: File, path: &Path) -> Result<Self, ConversionError> {
        Self::open_at_depth(file, path, 0)
    }

    fn open_at_depth(mut file: File, path: &Path, depth: usize) -> Result<Self, ConversionError> {
        let mut buf = Vec::with_capacity(V3_HEADER_LEN + 8);
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.by_ref().take(V3_HEADER_LEN as u64 + 8).read_to_end(&mut buf))
            .map_err(|source| ConversionError::Read { offset: 0, source })?;

        let header = Qcow2Header::parse(&buf)?;
        header.check_readable()?;

        if header.incompatible_features & INCOMPAT_DIRTY != 0 {
            debug!(path = %path.display(), "qcow2 image is marked dirty, reading anyway");
        }

        let backing = if header.backing_file_offset != 0 && header.backing_file_size > 0 {
            if depth >= MAX_BACKING_DEPTH {
                return Err(ConversionError::unreadable(format!(
                    "backing chain is deeper than {MAX_BACKING_DEPTH} images"
                )));
            }
            let backing_path = read_backing_path(&mut file, &header, path)?;
            debug!(
                path = %path.display(),
                backing = %backing_path.display(),
                "Opening qcow2 backing file"
            );
            Some(DiskImage::open_at_depth(&backing_path, depth + 1).map_err(|e| {
                ConversionError::unreadable(format!(
                    "backing file {}: {e}",
                    backing_path.display()
                ))
            })?)
        } else {
            None
        };

        Ok(Self {
            file,
            header,
            backing,
            l1_cache: None,
            l2_cache: None,
            l2_raw: Vec::new(),
            compressed: Vec::new(),
            decompressed: Vec::new(),
            decompressed_from: None,
        })
    }

    pub fn header(&self) -> &Qcow2Header {
        &self.header
    }

    pub fn virtual_size(&self) -> u64 {
        self.header.size
    }

    pub fn cluster_size(&self) -> u64 {
        self.header.cluster_size()
    }

    pub fn has_backing_file(&self) -> bool {
        self.backing.is_some()
    }

    /// Fill `buf` with guest data at `offset`. Returns false when the whole
    /// range is known to be zero without reading data.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<bool, ConversionError> {
        let cluster_size = self.cluster_size();
        let mut done = 0usize;
        let mut any_data = false;

        while done < buf.len() {
            let pos = offset + done as u64;
            let in_cluster = pos % cluster_size;
            let chunk = (cluster_size - in_cluster).min((buf.len() - done) as u64) as usize;
            let out = &mut buf[done..done + chunk];

            if pos >= self.header.size {
                out.fill(0);
                done += chunk;
                continue;
            }

            let entry = self.l2_entry(pos / cluster_size)?;
            match self.classify(entry)? {
                Cluster::Data(host) => {
                    read_exact_at(&mut self.file, host + in_cluster, out)?;
                    any_data = true;
                }
                Cluster::Compressed { offset, size } => {
                    self.decompress(offset, size)?;
                    let start = in_cluster as usize;
                    out.copy_from_slice(&self.decompressed[start..start + chunk]);
                    any_data = true;
                }
                Cluster::Zero => out.fill(0),
                Cluster::Unallocated => match self.backing.as_mut() {
                    Some(backing) => any_data |= backing.read_at(pos, out)?,
                    None => out.fill(0),
                },
            }
            done += chunk;
        }

        Ok(any_data)
    }

    fn l2_entry(&mut self, cluster_index: u64) -> Result<u64, ConversionError> {
        let l2_entries = self.header.l2_entries();
        let l1_index = cluster_index / l2_entries;
        if l1_index >= u64::from(self.header.l1_size) {
            return Ok(0);
        }

        let l1_entry = match self.l1_cache {
            Some((index, entry)) if index == l1_index => entry,
            _ => {
                let mut raw = [0u8; 8];
                read_exact_at(
                    &mut self.file,
                    self.header.l1_table_offset + l1_index * 8,
                    &mut raw,
                )?;
                let entry = u64::from_be_bytes(raw);
                self.l1_cache = Some((l1_index, entry));
                entry
            }
        };

        let l2_offset = l1_entry & OFFSET_MASK;
        if l2_offset == 0 {
            return Ok(0);
        }
        if l2_offset % self.cluster_size() != 0 {
            return Err(ConversionError::unreadable(format!(
                "L2 table offset {l2_offset:#x} is not cluster aligned"
            )));
        }

        let cached = matches!(&self.l2_cache, Some((offset, _)) if *offset == l2_offset);
        if !cached {
            self.load_l2_table(l2_offset)?;
        }

        let index = (cluster_index % l2_entries) as usize;
        Ok(self
            .l2_cache
            .as_ref()
            .map(|(_, table)| table[index])
            .unwrap_or(0))
    }

    fn load_l2_table(&mut self, l2_offset: u64) -> Result<(), ConversionError> {
        let cluster_size = self.cluster_size() as usize;
        self.l2_raw.resize(cluster_size, 0);
        read_exact_at(&mut self.file, l2_offset, &mut self.l2_raw)?;

        let mut table = match self.l2_cache.take() {
            Some((_, table)) => table,
            None => Vec::with_capacity(cluster_size / 8),
        };
        table.clear();
        table.extend(self.l2_raw.chunks_exact(8).map(|c| be_u64(c, 0)));
        self.l2_cache = Some((l2_offset, table));
        Ok(())
    }

    fn classify(&self, entry: u64) -> Result<Cluster, ConversionError> {
        if entry & OFLAG_COMPRESSED != 0 {
            let csize_shift = 62 - (self.header.cluster_bits - 8);
            let csize_mask = (1u64 << (self.header.cluster_bits - 8)) - 1;
            let offset = entry & ((1u64 << csize_shift) - 1);
            let sectors = ((entry >> csize_shift) & csize_mask) + 1;
            let size = sectors * 512 - (offset & 511);
            return Ok(Cluster::Compressed { offset, size });
        }

        if self.header.version >= 3 && entry & OFLAG_ZERO != 0 {
            return Ok(Cluster::Zero);
        }

        let host = entry & OFFSET_MASK;
        if host == 0 {
            return Ok(Cluster::Unallocated);
        }
        if host % self.cluster_size() != 0 {
            return Err(ConversionError::unreadable(format!(
                "data cluster offset {host:#x} is not cluster aligned"
            )));
        }
        Ok(Cluster::Data(host))
    }

    fn decompress(&mut self, offset: u64, size: u64) -> Result<(), ConversionError> {
        if self.decompressed_from == Some(offset) {
            return Ok(());
        }

        self.compressed.resize(size as usize, 0);
        // the last compressed cluster may end before its final sector
        let read = read_at_most(&mut self.file, offset, &mut self.compressed)?;

        self.decompressed.resize(self.cluster_size() as usize, 0);
        let mut decoder = DeflateDecoder::new(&self.compressed[..read]);
        decoder.read_exact(&mut self.decompressed).map_err(|e| {
            ConversionError::unreadable(format!(
                "failed to decompress cluster at offset {offset:#x}: {e}"
            ))
        })?;

        self.decompressed_from = Some(offset);
        Ok(())
    }
}

fn read_backing_path(
    file: &mut File,
    header: &Qcow2Header,
    image_path: &Path,
) -> Result<PathBuf, ConversionError> {
    let mut name = vec![0u8; header.backing_file_size as usize];
    read_exact_at(file, header.backing_file_offset, &mut name)?;
    let name = String::from_utf8(name)
        .map_err(|_| ConversionError::unreadable("backing file name is not UTF-8"))?;

    let backing = PathBuf::from(&name);
    if backing.is_absolute() {
        return Ok(backing);
    }
    Ok(image_path
        .parent()
        .map(|dir| dir.join(&backing))
        .unwrap_or(backing))
}

fn read_exact_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), ConversionError> {
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buf))
        .map_err(|source| ConversionError::Read { offset, source })
}

fn read_at_most(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<usize, ConversionError> {
    let result = (|| -> io::Result<usize> {
        file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    })();
    result.map_err(|source| ConversionError::Read { offset, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vmprep_testing::{ClusterContent, Qcow2Builder, MIB};

    fn open(path: &Path) -> Result<Qcow2Image, ConversionError> {
        Qcow2Image::open(File::open(path).unwrap(), path)
    }

    #[test]
    fn test_parse_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("disk.qcow2");
        Qcow2Builder::new(8 * MIB).write_to(&path).unwrap();

        let image = open(&path).unwrap();
        assert_eq!(image.header().version, 3);
        assert_eq!(image.virtual_size(), 8 * MIB);
        assert_eq!(image.cluster_size(), 64 * 1024);
        assert!(!image.has_backing_file());
    }

    #[test]
    fn test_version2_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("v2.qcow2");
        Qcow2Builder::new(MIB)
            .version(2)
            .cluster(0, ClusterContent::Data(vec![7; 512]))
            .write_to(&path)
            .unwrap();

        let mut image = open(&path).unwrap();
        assert_eq!(image.header().version, 2);
        let mut buf = vec![0u8; 512];
        assert!(image.read_at(0, &mut buf).unwrap());
        assert!(buf.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_read_unallocated_is_zero() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sparse.qcow2");
        Qcow2Builder::new(4 * MIB).write_to(&path).unwrap();

        let mut image = open(&path).unwrap();
        let mut buf = vec![0xffu8; 4096];
        assert!(!image.read_at(MIB, &mut buf).unwrap());
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_across_cluster_boundary() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("span.qcow2");
        let builder = Qcow2Builder::new(MIB);
        let cluster = builder.cluster_size();
        builder
            .cluster(0, ClusterContent::Data(vec![1; cluster as usize]))
            .cluster(cluster, ClusterContent::Data(vec![2; cluster as usize]))
            .write_to(&path)
            .unwrap();

        let mut image = open(&path).unwrap();
        let mut buf = vec![0u8; 16];
        image.read_at(cluster - 8, &mut buf).unwrap();
        assert_eq!(&buf[..8], &[1; 8]);
        assert_eq!(&buf[8..], &[2; 8]);
    }

    #[test]
    fn test_compressed_cluster() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("compressed.qcow2");
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        Qcow2Builder::new(MIB)
            .cluster(0, ClusterContent::Compressed(payload.clone()))
            .write_to(&path)
            .unwrap();

        let mut image = open(&path).unwrap();
        let mut buf = vec![0u8; payload.len()];
        assert!(image.read_at(0, &mut buf).unwrap());
        assert_eq!(buf, payload);
    }

    #[test]
    fn test_zero_flag_cluster() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("zero.qcow2");
        Qcow2Builder::new(MIB)
            .cluster(0, ClusterContent::Zero)
            .write_to(&path)
            .unwrap();

        let mut image = open(&path).unwrap();
        let mut buf = vec![0xaau8; 1024];
        assert!(!image.read_at(0, &mut buf).unwrap());
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_backing_file_read_through() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base.raw");
        std::fs::write(&base, vec![9u8; 128 * 1024]).unwrap();

        let overlay = temp.path().join("overlay.qcow2");
        Qcow2Builder::new(MIB)
            .backing_file("base.raw")
            .cluster(0, ClusterContent::Data(vec![5; 16]))
            .write_to(&overlay)
            .unwrap();

        let mut image = open(&overlay).unwrap();
        assert!(image.has_backing_file());

        let cluster = image.cluster_size();
        let mut buf = vec![0u8; 16];
        image.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, vec![5; 16]);

        // second cluster comes from the backing file
        image.read_at(cluster, &mut buf).unwrap();
        assert_eq!(buf, vec![9; 16]);

        // past the end of the shorter backing file
        assert!(!image.read_at(512 * 1024, &mut buf).unwrap());
        assert_eq!(buf, vec![0; 16]);
    }

    #[test]
    fn test_missing_backing_file() {
        let temp = TempDir::new().unwrap();
        let overlay = temp.path().join("overlay.qcow2");
        Qcow2Builder::new(MIB)
            .backing_file("gone.qcow2")
            .write_to(&overlay)
            .unwrap();

        let err = open(&overlay).err().unwrap();
        assert!(err.to_string().contains("gone.qcow2"));
    }

    #[test]
    fn test_rejects_encrypted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("enc.qcow2");
        Qcow2Builder::new(MIB).crypt_method(2).write_to(&path).unwrap();

        let err = open(&path).err().unwrap();
        assert!(err.to_string().contains("encrypted"));
    }

    #[test]
    fn test_rejects_corrupt_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corrupt.qcow2");
        Qcow2Builder::new(MIB)
            .incompatible_features(INCOMPAT_CORRUPT)
            .write_to(&path)
            .unwrap();

        let err = open(&path).err().unwrap();
        assert!(matches!(err, ConversionError::Unreadable { .. }));
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_dirty_flag_allowed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirty.qcow2");
        Qcow2Builder::new(MIB)
            .incompatible_features(INCOMPAT_DIRTY)
            .write_to(&path)
            .unwrap();

        assert!(open(&path).is_ok());
    }

    #[test]
    fn test_rejects_small_l1() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("short-l1.qcow2");
        // one L1 entry covers 8192 clusters of 64 KiB = 512 MiB
        Qcow2Builder::new(1024 * MIB).l1_size(1).write_to(&path).unwrap();

        let err = open(&path).err().unwrap();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_truncated_header() {
        let err = Qcow2Header::parse(b"QFI\xfb\x00\x00\x00\x03").unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    proptest::proptest! {
        #[test]
        fn prop_header_checks_never_panic(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..160)) {
            let mut bytes = bytes;
            if bytes.len() >= 8 {
                bytes[..4].copy_from_slice(b"QFI\xfb");
            }
            let _ = Qcow2Header::parse(&bytes).and_then(|h| h.check_readable());
        }
    }

    #[test]
    fn test_disk_image_open_raw() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.img");
        std::fs::write(&path, b"hello").unwrap();

        let mut image = DiskImage::open(&path).unwrap();
        assert_eq!(image.virtual_size(), 5);
        let mut buf = [0xffu8; 8];
        assert!(image.read_at(0, &mut buf).unwrap());
        assert_eq!(&buf, b"hello\0\0\0");
    }
}
