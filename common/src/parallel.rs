//! Concurrency-limited parallel iteration.

use rayon::prelude::*;

/// Maps `f` over `items` in parallel, with at most `max_concurrent` items in flight.
///
/// Output order matches input order. Items are processed in chunks of
/// `max_concurrent` on the global rayon pool.
///
/// # Panics
///
/// Panics if `max_concurrent` is 0.
pub fn par_map_limited<T, R, F>(items: &[T], max_concurrent: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    assert!(max_concurrent > 0, "max_concurrent must be > 0");

    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(max_concurrent) {
        let chunk_results: Vec<R> = chunk.par_iter().map(&f).collect();
        results.extend(chunk_results);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_keep_input_order() {
        let items: Vec<u32> = (0..50).collect();
        let result = par_map_limited(&items, 4, |&x| x * 10);
        let expected: Vec<u32> = (0..50).map(|x| x * 10).collect();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_empty_input() {
        let items: Vec<u32> = Vec::new();
        assert!(par_map_limited(&items, 2, |&x| x).is_empty());
    }

    #[test]
    #[should_panic(expected = "max_concurrent must be > 0")]
    fn test_zero_concurrency_panics() {
        par_map_limited(&[1, 2], 0, |&x| x);
    }

    #[test]
    fn test_in_flight_never_exceeds_limit() {
        let items: Vec<u32> = (0..16).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        par_map_limited(&items, 2, |&x| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            x
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
