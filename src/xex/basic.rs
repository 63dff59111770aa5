//! Basic ("sparse") XEX compression.
//!
//! The image is split into blocks of stored data, each followed by a run of
//! zeros that is not stored. Stored data of all blocks is concatenated in the
//! file (and encrypted as one CBC stream).

use super::raw::BasicBlock;
use crate::source::Source;
use crate::Error;

use std::sync::Arc;

#[derive(Debug, Clone)]
struct Block {
    /// Offset in the decompressed image.
    start: u64,
    /// Offset of the stored data in the parent.
    stored: u64,
    data_len: u64,
    zero_len: u64,
}

impl Block {
    fn end(&self) -> u64 {
        self.start + self.data_len + self.zero_len
    }
}

/// The decompressed view of a basic-compressed image.
#[derive(Debug)]
pub struct BasicSource {
    parent: Arc<dyn Source>,
    blocks: Vec<Block>,
    size: u64,
}

impl BasicSource {
    /// Builds the view from the block table.
    ///
    /// Fails if the stored data of the blocks does not fit into `parent`.
    pub fn new(parent: Arc<dyn Source>, table: &[BasicBlock]) -> Result<Self, Error> {
        let mut blocks = Vec::with_capacity(table.len());
        let mut start = 0u64;
        let mut stored = 0u64;
        for entry in table {
            let block = Block {
                start,
                stored,
                data_len: entry.data_size.into(),
                zero_len: entry.zero_size.into(),
            };
            start = block.end();
            stored += block.data_len;
            blocks.push(block);
        }

        if stored > parent.size() {
            return Err(Error::Malformed(format!(
                "compressed blocks need {:#X} bytes, only {:#X} stored",
                stored,
                parent.size()
            )));
        }
        Ok(Self {
            parent,
            blocks,
            size: start,
        })
    }
}

impl Source for BasicSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, Error> {
        if offset > self.size {
            return Err(Error::OutOfRange {
                offset,
                len: buf.len() as u64,
                size: self.size,
            });
        }

        let first = self.blocks.partition_point(|b| b.end() <= offset);
        let mut pos = offset;
        let mut done = 0;
        for block in &self.blocks[first..] {
            if done == buf.len() {
                break;
            }
            let data_end = block.start + block.data_len;
            if pos < data_end {
                let n = ((data_end - pos) as usize).min(buf.len() - done);
                let stored = block.stored + (pos - block.start);
                let read = self.parent.read_at(stored, &mut buf[done..done + n])?;
                done += read;
                pos += read as u64;
                if read < n {
                    return Ok(done);
                }
            }
            if done < buf.len() && pos < block.end() {
                let n = ((block.end() - pos) as usize).min(buf.len() - done);
                for b in &mut buf[done..done + n] {
                    *b = 0;
                }
                done += n;
                pos += n as u64;
            }
        }
        Ok(done)
    }

    fn is_open(&self) -> bool {
        self.parent.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemSource, SourceExt};

    fn blocks(sizes: &[(u32, u32)]) -> Vec<BasicBlock> {
        sizes
            .iter()
            .map(|&(data_size, zero_size)| BasicBlock { data_size, zero_size })
            .collect()
    }

    #[test]
    fn zero_runs_are_inserted() {
        let parent: Arc<dyn Source> = Arc::new(MemSource::new(vec![1, 2, 3, 4, 5]));
        let src = BasicSource::new(parent, &blocks(&[(2, 3), (3, 1)])).unwrap();
        assert_eq!(src.size(), 9);
        assert_eq!(src.read_vec(0, 9).unwrap(), vec![1, 2, 0, 0, 0, 3, 4, 5, 0]);
        assert_eq!(src.read_vec(4, 3).unwrap(), vec![0, 3, 4]);
        assert_eq!(src.read_vec(8, 1).unwrap(), vec![0]);
        assert!(src.read_vec(8, 2).is_err());
    }

    #[test]
    fn oversized_table_is_rejected() {
        let parent: Arc<dyn Source> = Arc::new(MemSource::new(vec![0; 4]));
        assert!(BasicSource::new(parent, &blocks(&[(2, 0), (3, 0)])).is_err());
    }
}
