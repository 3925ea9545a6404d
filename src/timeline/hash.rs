//! Content fingerprints for source clips.
//!
//! Files up to 2 000 000 bytes are hashed whole. Larger files hash their first
//! and last 1 000 000 bytes only, which is enough to tell media apart and keeps
//! relinking fast on big folders.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

const CHUNK: u64 = 1_000_000;

/// MD5 of the head (and tail when large) of `path`, lowercase hex.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut hasher = Md5::new();

    if size <= 2 * CHUNK {
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        hasher.update(&buf);
    } else {
        let mut buf = vec![0u8; CHUNK as usize];
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
        file.seek(SeekFrom::End(-(CHUNK as i64)))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of a synthetic clip's defining string (color, title XML, ...).
pub fn string_hash(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}
