//! Set-associative tag directory with LRU replacement.
//!
//! Each set keeps a usage stack: index 0 is the most recently used way, the
//! last index the least recently used one.

use serde::Serialize;

/// Tag state of one cache line.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Block {
    pub tag: u64,
    pub valid: bool,
    /// Bank reads in progress; a block being read is never replaced.
    pub read_count: u32,
}

#[derive(Debug)]
pub struct Directory {
    num_sets: usize,
    num_ways: usize,
    log2_block_size: u32,
    blocks: Vec<Vec<Block>>,
    usage: Vec<Vec<usize>>,
}

impl Directory {
    /// Creates a directory with every block invalid.
    pub fn new(num_sets: usize, num_ways: usize, log2_block_size: u32) -> Self {
        Self {
            num_sets,
            num_ways,
            log2_block_size,
            blocks: vec![vec![Block::default(); num_ways]; num_sets],
            usage: (0..num_sets).map(|_| (0..num_ways).collect()).collect(),
        }
    }

    /// Number of sets.
    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    /// Associativity.
    pub fn num_ways(&self) -> usize {
        self.num_ways
    }

    /// Set an address maps to.
    pub fn set_of(&self, address: u64) -> usize {
        ((address >> self.log2_block_size) % self.num_sets as u64) as usize
    }

    fn tag_of(&self, address: u64) -> u64 {
        address >> self.log2_block_size
    }

    /// Returns `(set, way)` of the valid block holding `address`.
    pub fn lookup(&self, address: u64) -> Option<(usize, usize)> {
        let set = self.set_of(address);
        let tag = self.tag_of(address);
        self.blocks[set]
            .iter()
            .position(|b| b.valid && b.tag == tag)
            .map(|way| (set, way))
    }

    /// Picks the way to replace for `address`: an invalid way if one exists,
    /// otherwise the least recently used one. Ways being read are skipped.
    pub fn find_victim(&self, address: u64) -> Option<(usize, usize)> {
        let set = self.set_of(address);
        let blocks = &self.blocks[set];

        let free = blocks
            .iter()
            .position(|b| !b.valid && b.read_count == 0);
        let lru = || {
            self.usage[set]
                .iter()
                .rev()
                .copied()
                .find(|&way| blocks[way].read_count == 0)
        };

        free.or_else(lru).map(|way| (set, way))
    }

    /// Marks a way most recently used.
    pub fn visit(&mut self, set: usize, way: usize) {
        let stack = &mut self.usage[set];
        if let Some(pos) = stack.iter().position(|&w| w == way) {
            stack.remove(pos);
        }
        stack.insert(0, way);
    }

    /// Installs the line holding `address` into `(set, way)`.
    pub fn fill(&mut self, set: usize, way: usize, address: u64) {
        let tag = self.tag_of(address);
        let block = &mut self.blocks[set][way];
        block.tag = tag;
        block.valid = true;
        self.visit(set, way);
    }

    /// Returns the block at `(set, way)`.
    pub fn block(&self, set: usize, way: usize) -> &Block {
        &self.blocks[set][way]
    }

    pub fn block_mut(&mut self, set: usize, way: usize) -> &mut Block {
        &mut self.blocks[set][way]
    }

    /// Drops the line held in `(set, way)`.
    pub fn invalidate(&mut self, set: usize, way: usize) {
        self.blocks[set][way].valid = false;
    }

    /// Invalidates every block. Read counts are kept.
    pub fn reset(&mut self) {
        for block in self.blocks.iter_mut().flatten() {
            block.valid = false;
        }
    }

    /// Number of valid blocks.
    pub fn num_valid(&self) -> usize {
        self.blocks.iter().flatten().filter(|b| b.valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_after_fill() {
        let mut dir = Directory::new(4, 2, 6);
        assert!(dir.lookup(0x1000).is_none());

        let (set, way) = dir.find_victim(0x1000).unwrap();
        dir.fill(set, way, 0x1000);

        assert_eq!(dir.lookup(0x1000), Some((set, way)));
        assert_eq!(dir.lookup(0x1004), Some((set, way)));
        assert!(dir.lookup(0x1040).is_none());
    }

    #[test]
    fn test_lru_victim() {
        let mut dir = Directory::new(1, 2, 6);
        dir.fill(0, 0, 0x000);
        dir.fill(0, 1, 0x040);
        dir.visit(0, 0);

        assert_eq!(dir.find_victim(0x080), Some((0, 1)));
    }

    #[test]
    fn test_blocks_being_read_are_not_replaced() {
        let mut dir = Directory::new(1, 2, 6);
        dir.fill(0, 0, 0x000);
        dir.fill(0, 1, 0x040);
        dir.block_mut(0, 1).read_count = 1;
        dir.visit(0, 0);

        assert_eq!(dir.find_victim(0x080), Some((0, 0)));

        dir.block_mut(0, 0).read_count = 1;
        assert_eq!(dir.find_victim(0x080), None);
    }

    #[test]
    fn test_reset_invalidates_everything() {
        let mut dir = Directory::new(2, 2, 6);
        dir.fill(0, 0, 0x000);
        dir.fill(1, 0, 0x040);
        assert_eq!(dir.num_valid(), 2);

        dir.reset();
        assert_eq!(dir.num_valid(), 0);
        assert!(dir.lookup(0x000).is_none());
    }
}
