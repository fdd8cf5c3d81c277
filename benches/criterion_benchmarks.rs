use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use disk_mru::config::MruCacheConfig;
use disk_mru::{Cacheable, MruCache, PersistError};
use std::sync::Arc;

/// In-memory object whose save and load do no I/O, so the benchmarks
/// measure bookkeeping only.
struct Slab {
    id: u64,
    cost: u64,
}

impl Cacheable for Slab {
    fn id(&self) -> u64 {
        self.id
    }

    fn memory_size(&self) -> u64 {
        self.cost
    }

    fn file_position(&self) -> u64 {
        // Scatter positions so flushes actually sort
        self.id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 40
    }

    fn save(&self) -> Result<(), PersistError> {
        black_box(self.id);
        Ok(())
    }

    fn load(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

fn make_cache(memory_available: u64, write_buffer_threshold: u64) -> MruCache<Slab> {
    MruCache::init(MruCacheConfig {
        memory_available,
        write_buffer_threshold,
    })
}

fn slabs(count: u64, cost: u64) -> Vec<Arc<Slab>> {
    (0..count).map(|id| Arc::new(Slab { id, cost })).collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    const CACHE_OBJECTS: u64 = 1000;
    let mut group = c.benchmark_group("Cache Operations");

    // Promotion of resident objects
    {
        let cache = make_cache(CACHE_OBJECTS, u64::MAX);
        let objects = slabs(CACHE_OBJECTS, 1);
        for obj in &objects {
            cache.loading(Arc::clone(obj)).unwrap();
        }

        group.bench_function("MRU touch hit", |b| {
            b.iter(|| {
                for i in 0..100 {
                    black_box(cache.touch(i % CACHE_OBJECTS).unwrap());
                }
            });
        });

        group.bench_function("MRU touch miss", |b| {
            b.iter(|| {
                for i in 0..100 {
                    black_box(cache.touch(i + CACHE_OBJECTS).unwrap());
                }
            });
        });

        group.bench_function("MRU loading resident", |b| {
            b.iter(|| {
                for obj in objects.iter().take(100) {
                    cache.loading(Arc::clone(obj)).unwrap();
                }
            });
        });
    }

    // Registration of new objects with eviction, no flush
    group.bench_function("MRU loading with eviction", |b| {
        let objects = slabs(2 * CACHE_OBJECTS, 1);
        b.iter_batched(
            || make_cache(CACHE_OBJECTS, u64::MAX),
            |cache| {
                for obj in &objects {
                    cache.loading(Arc::clone(obj)).unwrap();
                }
                cache
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();

    let mut group = c.benchmark_group("Write Buffer Flush");
    for &buffered in &[100u64, 1_000, 10_000] {
        let objects = slabs(buffered + 1, 1);
        group.bench_with_input(
            BenchmarkId::from_parameter(buffered),
            &buffered,
            |b, _| {
                b.iter_batched(
                    || {
                        let cache = make_cache(0, u64::MAX);
                        for obj in &objects {
                            cache.loading(Arc::clone(obj)).unwrap();
                        }
                        cache
                    },
                    |cache| black_box(cache.write_old_objects().unwrap()),
                    BatchSize::SmallInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
