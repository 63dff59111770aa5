//! Helpers shared by the integration tests.

#![allow(dead_code)]

use romprops::{Error, MemSource, Source};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An in-memory source that counts the reads made through it.
#[derive(Debug)]
pub struct CountingSource {
    inner: MemSource,
    reads: AtomicUsize,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemSource::new(data),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Source for CountingSource {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_at(offset, buf)
    }
}

fn put_utf16(data: &mut [u8], offset: usize, s: &str) {
    for (i, c) in s.encode_utf16().enumerate() {
        data[offset + i * 2..offset + i * 2 + 2].copy_from_slice(&c.to_le_bytes());
    }
}

/// Builds an SMDH with an English title and a large icon of one RGB565 color.
pub fn smdh(title: &str, publisher: &str, icon_color: u16) -> Vec<u8> {
    let mut data = vec![0u8; 0x36C0];
    data[..4].copy_from_slice(b"SMDH");
    let english = 0x08 + 0x200;
    put_utf16(&mut data, english, title);
    put_utf16(&mut data, english + 0x80, title);
    put_utf16(&mut data, english + 0x180, publisher);
    for px in data[0x24C0..0x36C0].chunks_exact_mut(2) {
        px.copy_from_slice(&icon_color.to_le_bytes());
    }
    data
}
