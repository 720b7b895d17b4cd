//! SHA-256 content digests.
//!
//! Reads are hashed in fixed-size chunks so large data products never have to be
//! buffered whole. Writes are hashed in flight by [`HashingWriter`], which means the
//! digest recorded for a write is exactly the digest of the bytes the caller handed
//! over, not of whatever is on disk afterwards. [`HashingReader`] does the same for
//! bytes served to a reader.

use prov_types::ContentHash;
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};

const CHUNK_SIZE: usize = 64 * 1024;

fn finish(hasher: Sha256) -> ContentHash {
    let hash_bytes: [u8; 32] = hasher.finalize().into();
    ContentHash::from_bytes(&hash_bytes)
}

/// Computes the digest of an in-memory buffer.
pub fn digest_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    finish(hasher)
}

/// Computes the digest of everything `reader` yields.
///
/// # Errors
///
/// Returns the first I/O error raised by the reader. `Interrupted` reads are retried.
pub fn digest_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(finish(hasher))
}

/// Writer adapter that digests every byte accepted by the inner writer.
///
/// Only bytes the inner writer reports as written are hashed, so a short write
/// followed by an error leaves the digest consistent with what actually landed.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Number of bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Splits the adapter without flushing.
    pub fn into_parts(self) -> (W, ContentHash, u64) {
        (self.inner, finish(self.hasher), self.bytes_written)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter that digests every byte handed to the caller.
#[derive(Debug)]
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Digest of the bytes read so far.
    pub fn digest(&self) -> ContentHash {
        finish(self.hasher.clone())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // sha256("Hello, World!")
    const HELLO_DIGEST: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    #[test]
    fn test_digest_bytes_known_value() {
        assert_eq!(digest_bytes(b"Hello, World!").as_str(), HELLO_DIGEST);
    }

    #[test]
    fn test_digest_reader_matches_digest_bytes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let from_reader = digest_reader(Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, digest_bytes(&data));
    }

    #[test]
    fn test_digest_of_empty_input() {
        assert_eq!(
            digest_reader(io::empty()).unwrap().as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hashing_writer_digests_written_bytes() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"Hello, ").unwrap();
        writer.write_all(b"World!").unwrap();
        assert_eq!(writer.bytes_written(), 13);

        let (inner, hash, _) = writer.into_parts();
        assert_eq!(inner, b"Hello, World!");
        assert_eq!(hash.as_str(), HELLO_DIGEST);
    }

    #[test]
    fn test_hashing_reader_digests_served_bytes() {
        let mut reader = HashingReader::new(Cursor::new(b"Hello, World!".to_vec()));

        let mut head = [0u8; 5];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(reader.digest(), digest_bytes(b"Hello"));

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(reader.bytes_read(), 13);
        assert_eq!(reader.digest().as_str(), HELLO_DIGEST);
    }

    #[test]
    fn test_hashing_writer_only_counts_accepted_bytes() {
        struct Short(Vec<u8>);
        impl Write for Short {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let n = buf.len().min(3);
                self.0.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut writer = HashingWriter::new(Short(Vec::new()));
        assert_eq!(writer.write(b"abcdef").unwrap(), 3);

        let (inner, hash, written) = writer.into_parts();
        assert_eq!(written, 3);
        assert_eq!(inner.0, b"abc");
        assert_eq!(hash, digest_bytes(b"abc"));
    }
}
