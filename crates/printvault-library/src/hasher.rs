use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Compute the SHA-256 content digest of a file. Streams in fixed-size reads,
/// so arbitrarily large files never have to fit in memory. The digest is the
/// sole source of truth for library identity.
pub fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let file = std::fs::File::open(path)?;
    sha256_stream(file)
}

/// Compute the SHA-256 digest of an arbitrary byte stream.
pub fn sha256_stream<R: Read>(mut reader: R) -> anyhow::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let result = hasher.finalize();
    Ok(format!("{:x}", result))
}

/// Compute the XXH3-64 hash of a file. Fast change-detection hash for the
/// scan cache, never used for identity.
pub fn xxh3_file(path: &Path) -> anyhow::Result<String> {
    let data = std::fs::read(path)?;
    let hash = xxh3_64(&data);
    Ok(format!("{:016x}", hash))
}
