use pagetree::{Btree, MemoryBackend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

const ELEMENTS: usize = 100_000;

/// Returns pairs of key, value
fn gen_data(count: usize) -> Vec<([u8; 16], [u8; 32])> {
    let mut rng = StdRng::seed_from_u64(0);
    let mut pairs = vec![];
    for _ in 0..count {
        pairs.push(rng.gen());
    }
    pairs
}

fn main() {
    let pairs = gen_data(ELEMENTS);
    let mut tree = Btree::new(MemoryBackend::new());

    let start = Instant::now();
    for (key, value) in &pairs {
        tree.insert(key, value);
    }
    let duration = start.elapsed();
    println!(
        "pagetree: Loaded {} pairs in {}ms",
        ELEMENTS,
        duration.as_millis()
    );

    let start = Instant::now();
    for (key, value) in &pairs {
        assert_eq!(tree.get(key).unwrap().value(), value);
    }
    let duration = start.elapsed();
    println!(
        "pagetree: Read {} pairs in {}ms",
        ELEMENTS,
        duration.as_millis()
    );

    let start = Instant::now();
    let mut count = 0usize;
    for entry in tree.range() {
        count += entry.key().len() + entry.value().len();
    }
    let duration = start.elapsed();
    println!(
        "pagetree: Scanned {count} bytes in {}ms",
        duration.as_millis()
    );

    let start = Instant::now();
    for (key, _) in &pairs {
        assert!(tree.delete(key));
    }
    let duration = start.elapsed();
    println!(
        "pagetree: Removed {} pairs in {}ms",
        ELEMENTS,
        duration.as_millis()
    );
}
