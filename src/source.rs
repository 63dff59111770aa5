//! Random access byte sources.
//!
//! Every reader works on an `Arc<dyn Source>`. Sub-readers get a
//! [`PartitionSource`] (or one of the decrypting windows) that keeps its parent
//! alive, so a parent can never be freed while a view on it still exists.
//!
//! [`PartitionSource`]: struct.PartitionSource.html

use crate::crypto::{Aes128Cbc, Aes128Ctr, Key, BLOCK_SIZE};
use crate::raw::RawStruct;
use crate::Error;

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A readable, seekable byte container.
pub trait Source: Send + Sync + fmt::Debug {
    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is only smaller than requested
    /// when the end of the source was reached. Reads starting past the end
    /// fail with `Error::OutOfRange`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error>;

    fn is_open(&self) -> bool {
        true
    }
}

/// Convenience methods on top of `Source::read_at`.
pub trait SourceExt: Source {
    /// Fills `buf` completely or fails.
    ///
    /// A short read is an error, never partial success.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        if !self.is_open() {
            return Err(Error::Closed);
        }
        let n = self.read_at(offset, buf)?;
        if n != buf.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read at {:#X}: wanted {} bytes, got {}", offset, buf.len(), n),
            )));
        }
        Ok(())
    }

    fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Reads and decodes a fixed-layout structure at `offset`.
    fn read_struct<T: RawStruct>(&self, offset: u64) -> Result<T, Error> {
        let buf = self.read_vec(offset, T::SIZE)?;
        T::parse(&buf)
    }
}

impl<S: Source + ?Sized> SourceExt for S {}

fn check_offset(offset: u64, len: usize, size: u64) -> Result<(), Error> {
    if offset > size {
        Err(Error::OutOfRange {
            offset,
            len: len as u64,
            size,
        })
    } else {
        Ok(())
    }
}

/// A file on disk.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<Option<File>>,
    size: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_file(File::open(path)?)
    }

    pub fn from_file(file: File) -> Result<Self, Error> {
        let size = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(Some(file)),
            size,
        })
    }

    /// Closes the underlying file. Later reads fail with `Error::Closed`.
    pub fn close(&self) {
        if let Ok(mut file) = self.file.lock() {
            *file = None;
        }
    }
}

impl Source for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        check_offset(offset, buf.len(), self.size)?;
        let mut guard = self
            .file
            .lock()
            .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "file lock poisoned")))?;
        let file = guard.as_mut().ok_or(Error::Closed)?;

        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn is_open(&self) -> bool {
        self.file.lock().map(|f| f.is_some()).unwrap_or(false)
    }
}

/// An in-memory buffer.
#[derive(Clone)]
pub struct MemSource {
    data: Arc<[u8]>,
}

impl MemSource {
    pub fn new<D: Into<Arc<[u8]>>>(data: D) -> Self {
        Self { data: data.into() }
    }
}

impl fmt::Debug for MemSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemSource")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Source for MemSource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        check_offset(offset, buf.len(), self.size())?;
        let rest = self.data.get(offset as usize..).unwrap_or(&[]);
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}

/// Validates a `base..base+len` window against a parent of size `size`.
fn check_window(base: u64, len: u64, size: u64) -> Result<(), Error> {
    let end = base
        .checked_add(len)
        .ok_or_else(|| Error::addr_overflow(base, len))?;
    if end > size {
        return Err(Error::OutOfRange {
            offset: base,
            len,
            size,
        });
    }
    Ok(())
}

/// A window `[base, base + len)` into a parent source.
#[derive(Debug)]
pub struct PartitionSource {
    parent: Arc<dyn Source>,
    base: u64,
    len: u64,
}

impl PartitionSource {
    /// Creates a window, failing if it does not fit inside `parent`.
    pub fn new(parent: Arc<dyn Source>, base: u64, len: u64) -> Result<Self, Error> {
        check_window(base, len, parent.size())?;
        Ok(Self { parent, base, len })
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl Source for PartitionSource {
    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        check_offset(offset, buf.len(), self.len)?;
        let n = ((self.len - offset).min(buf.len() as u64)) as usize;
        self.parent.read_at(self.base + offset, &mut buf[..n])
    }

    fn is_open(&self) -> bool {
        self.parent.is_open()
    }
}

/// An AES-128-CBC encrypted window, read as plaintext.
///
/// Block `n` is decrypted using ciphertext block `n - 1` (or the IV for the
/// first block), which makes random access possible. Without a key the window
/// passes the stored bytes through unchanged.
#[derive(Debug)]
pub struct CbcSource {
    parent: Arc<dyn Source>,
    base: u64,
    len: u64,
    cipher: Option<Aes128Cbc>,
    iv: [u8; 16],
}

impl CbcSource {
    pub fn new(
        parent: Arc<dyn Source>,
        base: u64,
        len: u64,
        key: Option<&Key>,
        iv: [u8; 16],
    ) -> Result<Self, Error> {
        check_window(base, len, parent.size())?;
        Ok(Self {
            parent,
            base,
            len,
            cipher: key.map(Aes128Cbc::new),
            iv,
        })
    }
}

impl Source for CbcSource {
    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        check_offset(offset, buf.len(), self.len)?;
        let n = ((self.len - offset).min(buf.len() as u64)) as usize;
        let cipher = match &self.cipher {
            Some(cipher) => cipher,
            None => return self.parent.read_at(self.base + offset, &mut buf[..n]),
        };
        if n == 0 {
            return Ok(0);
        }

        let block = BLOCK_SIZE as u64;
        let start = offset / block * block;
        let end = ((offset + n as u64 + block - 1) / block * block).min(self.len);
        // The block before `start` is the chaining value.
        let chain_start = start.saturating_sub(block);

        let mut data = vec![0; (end - chain_start) as usize];
        self.parent.read_exact_at(self.base + chain_start, &mut data)?;

        let (iv, body) = if start == 0 {
            (self.iv, &mut data[..])
        } else {
            let (prev, body) = data.split_at_mut(BLOCK_SIZE);
            let mut iv = [0; 16];
            iv.copy_from_slice(prev);
            (iv, body)
        };
        // A trailing partial block cannot be decrypted and is passed through.
        let whole = body.len() / BLOCK_SIZE * BLOCK_SIZE;
        cipher.decrypt(&iv, &mut body[..whole])?;

        let skip = (offset - start) as usize;
        buf[..n].copy_from_slice(&body[skip..skip + n]);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.parent.is_open()
    }
}

/// An AES-128-CTR encrypted window, read as plaintext.
///
/// The counter for byte offset `o` is `counter + o / 16`.
#[derive(Debug)]
pub struct CtrSource {
    parent: Arc<dyn Source>,
    base: u64,
    len: u64,
    cipher: Aes128Ctr,
    counter: u128,
}

impl CtrSource {
    pub fn new(
        parent: Arc<dyn Source>,
        base: u64,
        len: u64,
        key: &Key,
        counter: u128,
    ) -> Result<Self, Error> {
        check_window(base, len, parent.size())?;
        Ok(Self {
            parent,
            base,
            len,
            cipher: Aes128Ctr::new(key),
            counter,
        })
    }
}

impl Source for CtrSource {
    fn size(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        check_offset(offset, buf.len(), self.len)?;
        let n = ((self.len - offset).min(buf.len() as u64)) as usize;
        let buf = &mut buf[..n];
        self.parent.read_exact_at(self.base + offset, buf)?;

        let block = BLOCK_SIZE as u64;
        let counter = self.counter.wrapping_add(u128::from(offset / block));
        self.cipher.apply(counter, (offset % block) as usize, buf);
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.parent.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(len: usize) -> Arc<dyn Source> {
        Arc::new(MemSource::new((0..len).map(|i| i as u8).collect::<Vec<_>>()))
    }

    #[test]
    fn mem_source_short_read_at_end() {
        let src = mem(10);
        let mut buf = [0; 4];
        assert_eq!(src.read_at(8, &mut buf).unwrap(), 2);
        assert!(src.read_exact_at(8, &mut buf).is_err());
        assert_eq!(src.read_at(10, &mut buf).unwrap(), 0);
        match src.read_at(11, &mut buf) {
            Err(Error::OutOfRange { offset: 11, .. }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn partition_window() {
        let src = mem(100);
        let part = PartitionSource::new(src.clone(), 10, 20).unwrap();
        assert_eq!(part.size(), 20);
        assert_eq!(part.read_vec(0, 3).unwrap(), vec![10, 11, 12]);
        // reads never leave the window, even though the parent has more data
        let mut buf = [0; 8];
        assert_eq!(part.read_at(16, &mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[26, 27, 28, 29]);
        assert!(part.read_exact_at(16, &mut buf).is_err());
        assert_eq!(part.read_at(21, &mut buf).unwrap_err().code(), -34);
    }

    #[test]
    fn partition_validates_bounds() {
        let src = mem(100);
        assert!(PartitionSource::new(src.clone(), 90, 11).is_err());
        assert!(PartitionSource::new(src.clone(), u64::max_value(), 2).is_err());
        assert!(PartitionSource::new(src, 100, 0).is_ok());
    }

    #[test]
    fn nested_partitions_keep_parent_alive() {
        let inner = {
            let src = mem(64);
            let outer: Arc<dyn Source> = Arc::new(PartitionSource::new(src, 16, 32).unwrap());
            PartitionSource::new(outer, 8, 8).unwrap()
        };
        assert_eq!(inner.read_vec(0, 2).unwrap(), vec![24, 25]);
    }

    #[test]
    fn cbc_without_key_is_passthrough() {
        let src = mem(64);
        let cbc = CbcSource::new(src, 16, 32, None, [0; 16]).unwrap();
        assert_eq!(cbc.read_vec(1, 2).unwrap(), vec![17, 18]);
    }

    #[test]
    fn cbc_random_access() {
        use aes::cipher::generic_array::GenericArray;
        use aes::cipher::{BlockEncrypt, KeyInit};

        let key = [0x42; 16];
        let iv = [0x24; 16];
        let plain: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(7)).collect();

        // encrypt with CBC by hand
        let aes = aes::Aes128::new(GenericArray::from_slice(&key));
        let mut cipher_text = Vec::new();
        let mut chain = iv;
        for chunk in plain.chunks(16) {
            let mut block = GenericArray::clone_from_slice(chunk);
            block.iter_mut().zip(chain.iter()).for_each(|(a, b)| *a ^= b);
            aes.encrypt_block(&mut block);
            chain.copy_from_slice(&block);
            cipher_text.extend_from_slice(&block);
        }

        let src: Arc<dyn Source> = Arc::new(MemSource::new(cipher_text));
        let cbc = CbcSource::new(src, 0, 64, Some(&key), iv).unwrap();
        assert_eq!(cbc.read_vec(0, 64).unwrap(), plain);
        assert_eq!(cbc.read_vec(20, 30).unwrap(), &plain[20..50]);
        assert_eq!(cbc.read_vec(63, 1).unwrap(), &plain[63..]);
    }

    #[test]
    fn ctr_round_trip() {
        let key = [7; 16];
        let counter = 0xAABB_u128 << 64;
        let plain: Vec<u8> = (0..48u8).collect();
        let mut encrypted = plain.clone();
        Aes128Ctr::new(&key).apply(counter, 0, &mut encrypted);

        let src: Arc<dyn Source> = Arc::new(MemSource::new(encrypted));
        let ctr = CtrSource::new(src, 0, 48, &key, counter).unwrap();
        assert_eq!(ctr.read_vec(0, 48).unwrap(), plain);
        assert_eq!(ctr.read_vec(19, 7).unwrap(), &plain[19..26]);
    }
}
