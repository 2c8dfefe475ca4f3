//! Sparse byte-addressed backing store.

use std::collections::HashMap;

const LOG2_PAGE_SIZE: u32 = 12;
const PAGE_SIZE: u64 = 1 << LOG2_PAGE_SIZE;

/// Byte storage allocated page by page on first write.
///
/// Unwritten bytes read as zero.
#[derive(Debug, Default, Clone)]
pub struct Storage {
    pages: HashMap<u64, Box<[u8]>>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `len` bytes starting at `address`.
    pub fn read(&self, address: u64, len: u64) -> Vec<u8> {
        (address..address + len)
            .map(|addr| {
                self.pages
                    .get(&(addr >> LOG2_PAGE_SIZE))
                    .map_or(0, |page| page[(addr % PAGE_SIZE) as usize])
            })
            .collect()
    }

    /// Writes `data` starting at `address`.
    pub fn write(&mut self, address: u64, data: &[u8]) {
        for (addr, byte) in (address..).zip(data) {
            let page = self
                .pages
                .entry(addr >> LOG2_PAGE_SIZE)
                .or_insert_with(|| vec![0; PAGE_SIZE as usize].into_boxed_slice());
            page[(addr % PAGE_SIZE) as usize] = *byte;
        }
    }

    /// Number of pages touched by writes.
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }
}
