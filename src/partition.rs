/// Half-open range of segment indices handled by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentIndexRange {
    pub start: usize,
    pub end: usize,
}

impl SegmentIndexRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `0..num_segments` into at most `min(cores, max_ranges)` contiguous,
/// non-overlapping, non-empty ranges covering every index. Earlier ranges
/// take the remainder, so sizes differ by at most one.
pub fn get_parallel_intervals(num_segments: usize, cores: usize, max_ranges: usize) -> Vec<SegmentIndexRange> {
    let count = cores.min(max_ranges).min(num_segments).max(1);
    if num_segments == 0 {
        return Vec::new();
    }
    let base = num_segments / count;
    let remainder = num_segments % count;

    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let size = base + usize::from(i < remainder);
        ranges.push(SegmentIndexRange {
            start,
            end: start + size,
        });
        start += size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(ranges: &[SegmentIndexRange], n: usize) {
        let mut expected = 0;
        for range in ranges {
            assert_eq!(range.start, expected);
            assert!(!range.is_empty());
            expected = range.end;
        }
        assert_eq!(expected, n);
    }

    #[test]
    fn test_even_split() {
        let ranges = get_parallel_intervals(100, 4, 30);
        assert_eq!(ranges.len(), 4);
        assert!(ranges.iter().all(|r| r.len() == 25));
        assert_covers(&ranges, 100);
    }

    #[test]
    fn test_uneven_split() {
        let ranges = get_parallel_intervals(10, 3, 30);
        let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_covers(&ranges, 10);
    }

    #[test]
    fn test_range_cap() {
        assert_eq!(get_parallel_intervals(1000, 64, 30).len(), 30);
        assert_covers(&get_parallel_intervals(1000, 64, 30), 1000);
    }

    #[test]
    fn test_fewer_segments_than_cores() {
        let ranges = get_parallel_intervals(3, 16, 30);
        assert_eq!(ranges.len(), 3);
        assert_covers(&ranges, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(get_parallel_intervals(0, 8, 30).is_empty());
    }
}
