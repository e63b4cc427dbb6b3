use std::io::Read;

use super::ContainerError;

/// Magic bytes of a gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Magic bytes of a zip local file header.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Magic bytes of a zip end-of-central-directory record (empty archive).
pub const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

const TAR_BLOCK: usize = 512;
const USTAR_MAGIC_OFFSET: usize = 257;

/// Archive formats a package can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Uncompressed tar archive (`.tar`).
    Tar,
    /// Gzip-compressed tar archive (`.tar.gz` / `.tgz`).
    TarGz,
    /// Zip archive (`.zip`).
    Zip,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        })
    }
}

impl ArchiveFormat {
    /// Guess the format from a file name. `None` for unknown extensions.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.to_lowercase();

        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".tar") {
            Some(Self::Tar)
        } else if path.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Detect the format from content alone.
    pub fn sniff(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.starts_with(&GZIP_MAGIC) {
            // A gzip stream is only a package if it wraps a tar archive.
            let mut head = Vec::with_capacity(TAR_BLOCK);
            flate2::read::GzDecoder::new(bytes)
                .take(TAR_BLOCK as u64)
                .read_to_end(&mut head)
                .map_err(|e| ContainerError::Malformed(format!("gzip stream: {e}")))?;
            return if is_tar_header(&head) {
                Ok(Self::TarGz)
            } else {
                Err(ContainerError::UnsupportedFormat(
                    "gzip stream does not contain a tar archive".to_string(),
                ))
            };
        }

        if bytes.starts_with(&ZIP_MAGIC) || bytes.starts_with(&ZIP_EMPTY_MAGIC) {
            return Ok(Self::Zip);
        }

        if is_tar_header(bytes) {
            return Ok(Self::Tar);
        }

        Err(ContainerError::UnsupportedFormat(
            "unrecognized archive signature".to_string(),
        ))
    }

    pub fn is_gzip(self) -> bool {
        matches!(self, Self::TarGz)
    }
}

/// Whether `block` starts with a tar header: ustar magic, a valid v7
/// checksum, or the all-zero end-of-archive marker of an empty archive.
fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK {
        return false;
    }
    let block = &block[..TAR_BLOCK];

    if &block[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar" {
        return true;
    }
    if block.iter().all(|b| *b == 0) {
        return true;
    }

    // Pre-POSIX archives: trust the header checksum.
    let stored = std::str::from_utf8(&block[148..156])
        .ok()
        .map(|s| s.trim_matches(|c: char| c == '\0' || c == ' '))
        .and_then(|s| u32::from_str_radix(s, 8).ok());
    let computed: u32 = block
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { 32 } else { u32::from(*b) })
        .sum();
    stored == Some(computed)
}
