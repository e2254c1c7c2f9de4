//! Seeded train/test partitioning.

use rand::seq::SliceRandom;
use rand::Rng;

/// A disjoint partition of a record set.
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    pub train: Vec<T>,
    pub test: Vec<T>,
}

/// Shuffle `items` with `rng` and hold out `floor(n * test_percent / 100)` of
/// them. Every item lands in exactly one side.
pub fn split_records<T, R>(mut items: Vec<T>, test_percent: usize, rng: &mut R) -> Split<T>
where
    R: Rng + ?Sized,
{
    let test_len = (items.len() * test_percent.min(100)) / 100;
    items.shuffle(rng);
    let test = items.split_off(items.len() - test_len);
    Split { train: items, test }
}
