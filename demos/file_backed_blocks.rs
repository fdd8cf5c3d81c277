//! File-Backed Blocks
//!
//! Keeps a bounded number of fixed-size blocks of a scratch file in memory.
//! Blocks that fall out of the working set are written back in file order
//! once enough of them have piled up, then dropped from memory and read back
//! on demand.

use disk_mru::{CacheMetrics, Cacheable, MruCache, PersistError};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

const BLOCK_SIZE: usize = 4096;
const BLOCK_COUNT: u64 = 64;

struct Block {
    index: u64,
    file: Arc<Mutex<File>>,
    /// `None` while the block is on disk only.
    data: Mutex<Option<Vec<u8>>>,
}

impl Block {
    fn fill(&self, byte: u8) {
        *self.data.lock() = Some(vec![byte; BLOCK_SIZE]);
    }

    fn first_byte(&self) -> Option<u8> {
        self.data.lock().as_ref().map(|bytes| bytes[0])
    }

    fn release(&self) {
        *self.data.lock() = None;
    }
}

impl Cacheable for Block {
    fn id(&self) -> u64 {
        self.index
    }

    fn memory_size(&self) -> u64 {
        BLOCK_SIZE as u64
    }

    fn file_position(&self) -> u64 {
        self.index * BLOCK_SIZE as u64
    }

    fn save(&self) -> Result<(), PersistError> {
        let data = self.data.lock();
        let Some(bytes) = data.as_ref() else {
            return Ok(());
        };
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(self.file_position()))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn load(&self) -> Result<(), PersistError> {
        let mut bytes = vec![0u8; BLOCK_SIZE];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(self.file_position()))?;
            file.read_exact(&mut bytes)?;
        }
        *self.data.lock() = Some(bytes);
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Deleted when `dir` drops
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("blocks.bin");
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&path)?;
    file.set_len(BLOCK_COUNT * BLOCK_SIZE as u64)?;
    let file = Arc::new(Mutex::new(file));

    // Eight blocks resident; write back once four are waiting
    let cache: MruCache<Block> =
        MruCache::new(8 * BLOCK_SIZE as u64, 4 * BLOCK_SIZE as u64);

    let blocks: Vec<Arc<Block>> = (0..BLOCK_COUNT)
        .map(|index| {
            Arc::new(Block {
                index,
                file: Arc::clone(&file),
                data: Mutex::new(None),
            })
        })
        .collect();

    println!("Writing {} blocks of {} bytes to {}", BLOCK_COUNT, BLOCK_SIZE, path.display());
    // Visit blocks in a scattered order; flushes still go out sorted
    for step in 0..BLOCK_COUNT {
        let block = &blocks[((step * 37) % BLOCK_COUNT) as usize];
        block.fill(block.index as u8);
        cache.loading(Arc::clone(block))?;
    }
    cache.flush_all()?;

    // Everything is on disk now, so memory can go
    for block in &blocks {
        block.release();
    }

    println!("Reading back through the cache");
    for index in [3u64, 17, 42, 3] {
        let block = &blocks[index as usize];
        cache.access(block)?;
        println!("  block {:>2}: first byte = {:?}", index, block.first_byte());
    }

    println!("\nMetrics ({}):", cache.algorithm_name());
    for (name, value) in cache.metrics() {
        println!("  {:<24} {}", name, value);
    }

    Ok(())
}
