//! Container format detection from header bytes.
//!
//! Detection never trusts the file name. A file whose header matches no
//! known signature is `raw`.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use serde::{Deserialize, Serialize};

/// Number of leading bytes inspected.
const PROBE_LEN: usize = 512;

/// VHD footer size; fixed VHDs only carry the footer.
const VPC_FOOTER_LEN: u64 = 512;

const QCOW_MAGIC: &[u8; 4] = b"QFI\xfb";
const VMDK_SPARSE_MAGIC: &[u8; 4] = b"KDMV";
const VMDK_DESCRIPTOR: &[u8] = b"# Disk DescriptorFile";
const VHDX_MAGIC: &[u8; 8] = b"vhdxfile";
const VPC_COOKIE: &[u8; 8] = b"conectix";
const VDI_SIGNATURE_OFFSET: usize = 0x40;
const VDI_SIGNATURE: u32 = 0xbeda_107f;
const PARALLELS_MAGICS: [&[u8; 16]; 2] = [b"WithoutFreeSpace", b"WithouFreSpacExt"];

/// A disk image container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Raw,
    Qcow2,
    /// qcow version 1.
    Qcow,
    Vmdk,
    Vhdx,
    /// Virtual PC / VHD.
    Vpc,
    Vdi,
    Parallels,
}

impl ContainerFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerFormat::Raw => "raw",
            ContainerFormat::Qcow2 => "qcow2",
            ContainerFormat::Qcow => "qcow",
            ContainerFormat::Vmdk => "vmdk",
            ContainerFormat::Vhdx => "vhdx",
            ContainerFormat::Vpc => "vpc",
            ContainerFormat::Vdi => "vdi",
            ContainerFormat::Parallels => "parallels",
        }
    }

    /// True for the formats the converter can materialize as raw.
    pub fn is_convertible(&self) -> bool {
        matches!(self, ContainerFormat::Raw | ContainerFormat::Qcow2)
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the format from a header buffer alone.
pub fn detect_from_header(header: &[u8]) -> ContainerFormat {
    if header.len() >= 8 && header.starts_with(QCOW_MAGIC) {
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        return if version == 1 {
            ContainerFormat::Qcow
        } else {
            ContainerFormat::Qcow2
        };
    }
    if header.starts_with(VMDK_SPARSE_MAGIC) || header.starts_with(VMDK_DESCRIPTOR) {
        return ContainerFormat::Vmdk;
    }
    if header.starts_with(VHDX_MAGIC) {
        return ContainerFormat::Vhdx;
    }
    if header.starts_with(VPC_COOKIE) {
        return ContainerFormat::Vpc;
    }
    if PARALLELS_MAGICS.iter().any(|m| header.starts_with(*m)) {
        return ContainerFormat::Parallels;
    }
    if let Some(sig) = header.get(VDI_SIGNATURE_OFFSET..VDI_SIGNATURE_OFFSET + 4) {
        if u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]) == VDI_SIGNATURE {
            return ContainerFormat::Vdi;
        }
    }
    ContainerFormat::Raw
}

/// Detect the format of an open file, checking the VHD footer as well.
///
/// The file position is left unspecified.
pub fn sniff(file: &mut File) -> io::Result<ContainerFormat> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = Vec::with_capacity(PROBE_LEN);
    file.by_ref().take(PROBE_LEN as u64).read_to_end(&mut header)?;

    let detected = detect_from_header(&header);
    if detected != ContainerFormat::Raw {
        return Ok(detected);
    }

    let len = file.metadata()?.len();
    if len >= VPC_FOOTER_LEN {
        file.seek(SeekFrom::Start(len - VPC_FOOTER_LEN))?;
        let mut cookie = [0u8; 8];
        file.read_exact(&mut cookie)?;
        if &cookie == VPC_COOKIE {
            return Ok(ContainerFormat::Vpc);
        }
    }

    Ok(ContainerFormat::Raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header_with(prefix: &[u8]) -> Vec<u8> {
        let mut header = vec![0u8; PROBE_LEN];
        header[..prefix.len()].copy_from_slice(prefix);
        header
    }

    #[test]
    fn test_detect_qcow2() {
        assert_eq!(
            detect_from_header(&header_with(b"QFI\xfb\x00\x00\x00\x03")),
            ContainerFormat::Qcow2
        );
        assert_eq!(
            detect_from_header(&header_with(b"QFI\xfb\x00\x00\x00\x02")),
            ContainerFormat::Qcow2
        );
    }

    #[test]
    fn test_detect_qcow_v1() {
        assert_eq!(
            detect_from_header(&header_with(b"QFI\xfb\x00\x00\x00\x01")),
            ContainerFormat::Qcow
        );
    }

    #[test]
    fn test_detect_foreign_formats() {
        assert_eq!(detect_from_header(&header_with(b"KDMV")), ContainerFormat::Vmdk);
        assert_eq!(
            detect_from_header(&header_with(b"# Disk DescriptorFile\n")),
            ContainerFormat::Vmdk
        );
        assert_eq!(detect_from_header(&header_with(b"vhdxfile")), ContainerFormat::Vhdx);
        assert_eq!(detect_from_header(&header_with(b"conectix")), ContainerFormat::Vpc);
        assert_eq!(
            detect_from_header(&header_with(b"WithoutFreeSpace")),
            ContainerFormat::Parallels
        );

        let mut vdi = vec![0u8; PROBE_LEN];
        vdi[VDI_SIGNATURE_OFFSET..VDI_SIGNATURE_OFFSET + 4]
            .copy_from_slice(&VDI_SIGNATURE.to_le_bytes());
        assert_eq!(detect_from_header(&vdi), ContainerFormat::Vdi);
    }

    #[test]
    fn test_detect_raw_default() {
        assert_eq!(detect_from_header(&[]), ContainerFormat::Raw);
        assert_eq!(detect_from_header(b"QFI"), ContainerFormat::Raw);
        assert_eq!(detect_from_header(&[0u8; PROBE_LEN]), ContainerFormat::Raw);
    }

    #[test]
    fn test_sniff_fixed_vhd_footer() {
        let mut file = NamedTempFile::new().unwrap();
        let mut data = vec![0u8; 4096];
        let footer = data.len() - VPC_FOOTER_LEN as usize;
        data[footer..footer + 8].copy_from_slice(VPC_COOKIE);
        file.write_all(&data).unwrap();

        let mut handle = file.reopen().unwrap();
        assert_eq!(sniff(&mut handle).unwrap(), ContainerFormat::Vpc);
    }

    #[test]
    fn test_sniff_small_raw() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"tiny").unwrap();
        let mut handle = file.reopen().unwrap();
        assert_eq!(sniff(&mut handle).unwrap(), ContainerFormat::Raw);
    }

    #[test]
    fn test_convertible() {
        assert!(ContainerFormat::Raw.is_convertible());
        assert!(ContainerFormat::Qcow2.is_convertible());
        assert!(!ContainerFormat::Vmdk.is_convertible());
        assert!(!ContainerFormat::Qcow.is_convertible());
    }
}
