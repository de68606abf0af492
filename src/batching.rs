//! Cyclic, fixed-size batching for step-bounded inference loops.
//!
//! A `BatchGenerator` never ends. Every batch holds exactly `batch_size`
//! items; when the input runs out (between batches or in the middle of one)
//! it wraps back to the first item. Consumers that want each input once must
//! stop after `steps_for(len, batch_size)` batches and drop the overrun.

use crate::error::{Error, Result};

/// Number of batches needed to cover `len` items at least once.
pub fn steps_for(len: usize, batch_size: usize) -> usize
{
    len.div_ceil(batch_size)
}

pub struct BatchGenerator<'a, T, U, F>
where
    F: Fn(&T) -> U,
{
    items: &'a [T],
    batch_size: usize,
    cursor: usize,
    transform: F,
}

impl<'a, T: Clone> BatchGenerator<'a, T, T, fn(&T) -> T>
{
    /// Batches of clones of the input items.
    pub fn new(items: &'a [T], batch_size: usize) -> Result<Self>
    {
        Self::with_transform(items, batch_size, T::clone as fn(&T) -> T)
    }
}

impl<'a, T, U, F> BatchGenerator<'a, T, U, F>
where
    F: Fn(&T) -> U,
{
    /// Batches of `transform(item)`. Fails if `items` is empty or `batch_size` is 0.
    pub fn with_transform(items: &'a [T], batch_size: usize, transform: F) -> Result<Self>
    {
        if batch_size == 0 {
            return Err(Error::Configuration("Batch size must be positive".to_string()));
        }
        if items.is_empty() {
            return Err(Error::Configuration("Cannot batch an empty sequence".to_string()));
        }
        Ok(BatchGenerator { items, batch_size, cursor: 0, transform })
    }

    pub fn batch_size(&self) -> usize
    {
        self.batch_size
    }

    /// Batches needed to see every input item once.
    pub fn steps(&self) -> usize
    {
        steps_for(self.items.len(), self.batch_size)
    }
}

impl<'a, T, U, F> Iterator for BatchGenerator<'a, T, U, F>
where
    F: Fn(&T) -> U,
{
    type Item = Vec<U>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let len = self.items.len();
        let batch = (0..self.batch_size)
            .map(|offset| (self.transform)(&self.items[(self.cursor + offset) % len]))
            .collect();
        self.cursor = (self.cursor + self.batch_size) % len;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        (usize::MAX, None)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_covering_batches_reproduce_input()
    {
        let items: Vec<i32> = (0..11).collect();
        for batch_size in 1..=13 {
            let generator = BatchGenerator::new(&items, batch_size).unwrap();
            let steps = generator.steps();
            let mut seen: Vec<i32> = generator.take(steps).flatten().collect();
            seen.truncate(items.len());
            assert_eq!(seen, items, "batch size {}", batch_size);
        }
    }

    #[test]
    fn test_batches_are_always_full_and_wrap()
    {
        let items = vec!['a', 'b', 'c', 'd', 'e'];
        let batches: Vec<Vec<char>> = BatchGenerator::new(&items, 3).unwrap().take(4).collect();
        assert_eq!(
            batches,
            vec![
                vec!['a', 'b', 'c'],
                vec!['d', 'e', 'a'],
                vec!['b', 'c', 'd'],
                vec!['e', 'a', 'b'],
            ]
        );
    }

    #[test]
    fn test_batch_larger_than_input_repeats_items()
    {
        let items = vec![1, 2];
        let first = BatchGenerator::new(&items, 5).unwrap().next().unwrap();
        assert_eq!(first, vec![1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_transform_is_applied_per_item()
    {
        let items = vec![1, 2, 3, 4];
        let generator = BatchGenerator::with_transform(&items, 2, |x: &i32| x * 10).unwrap();
        let batches: Vec<Vec<i32>> = generator.take(2).collect();
        assert_eq!(batches, vec![vec![10, 20], vec![30, 40]]);
    }

    #[test]
    fn test_invalid_arguments_fail_fast()
    {
        let items = vec![1, 2, 3];
        assert!(matches!(BatchGenerator::new(&items, 0), Err(Error::Configuration(_))));

        let empty: Vec<i32> = Vec::new();
        assert!(matches!(BatchGenerator::new(&empty, 4), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_steps_for()
    {
        assert_eq!(steps_for(7, 3), 3);
        assert_eq!(steps_for(6, 3), 2);
        assert_eq!(steps_for(1, 100), 1);
        assert_eq!(steps_for(0, 3), 0);
    }
}
