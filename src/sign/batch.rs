//! Size and count bounded chunking of package lists

use crate::package::PackageRef;

/// Default cumulative size bound per batch (2 MiB)
pub const DEFAULT_MAX_SIZE: u64 = 2 * 1024 * 1024;

/// Default file count bound per batch
pub const DEFAULT_MAX_FILES: usize = 20;

/// Batch bounds; `None` disables a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_size: Option<u64>,
    pub max_files: Option<usize>,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_size: Some(DEFAULT_MAX_SIZE),
            max_files: Some(DEFAULT_MAX_FILES),
        }
    }
}

impl BatchLimits {
    /// Limits with both bounds disabled
    pub fn unbounded() -> Self {
        Self {
            max_size: None,
            max_files: None,
        }
    }

    /// Build from configured values where 0 means disabled.
    pub fn from_config(max_size_mib: u64, max_files: usize) -> Self {
        Self {
            max_size: (max_size_mib > 0).then(|| max_size_mib.saturating_mul(1024 * 1024)),
            max_files: (max_files > 0).then_some(max_files),
        }
    }

    fn admits(&self, size: u64, count: usize) -> bool {
        self.max_size.map_or(true, |max| size <= max) && self.max_files.map_or(true, |max| count <= max)
    }
}

/// Greedy first-fit chunks over a package slice
#[derive(Debug)]
pub struct Batches<'a> {
    rest: &'a [PackageRef],
    limits: BatchLimits,
}

/// Split `rpms` into successive non-empty chunks within `limits`.
pub fn split_batches(rpms: &[PackageRef], limits: BatchLimits) -> Batches<'_> {
    Batches { rest: rpms, limits }
}

impl<'a> Iterator for Batches<'a> {
    type Item = &'a [PackageRef];

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }

        // the first item always goes in, oversized or not
        let mut size = self.rest[0].size;
        let mut end = 1;
        while end < self.rest.len() {
            let next_size = size.saturating_add(self.rest[end].size);
            if !self.limits.admits(next_size, end + 1) {
                break;
            }
            size = next_size;
            end += 1;
        }

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.rest.is_empty() {
            (0, Some(0))
        } else {
            (1, Some(self.rest.len()))
        }
    }
}

impl std::iter::FusedIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::BuildInfo;

    fn sized(id: u64, size: u64) -> PackageRef {
        PackageRef {
            id,
            build: BuildInfo {
                id: 1,
                name: "b".to_string(),
                version: "1".to_string(),
                release: "1".to_string(),
            },
            name: format!("p{}", id),
            version: "1".to_string(),
            release: "1".to_string(),
            arch: "noarch".to_string(),
            size,
        }
    }

    fn ids(chunks: Batches<'_>) -> Vec<Vec<u64>> {
        chunks.map(|c| c.iter().map(|r| r.id).collect()).collect()
    }

    #[test]
    fn test_count_bound() {
        let rpms: Vec<_> = (1..=5).map(|i| sized(i, 1)).collect();
        let limits = BatchLimits {
            max_size: None,
            max_files: Some(2),
        };
        assert_eq!(ids(split_batches(&rpms, limits)), vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_size_bound() {
        let rpms = vec![sized(1, 40), sized(2, 50), sized(3, 20), sized(4, 90)];
        let limits = BatchLimits {
            max_size: Some(100),
            max_files: None,
        };
        assert_eq!(ids(split_batches(&rpms, limits)), vec![vec![1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn test_oversized_item_alone() {
        let rpms = vec![sized(1, 10), sized(2, 500), sized(3, 10)];
        let limits = BatchLimits {
            max_size: Some(100),
            max_files: Some(20),
        };
        assert_eq!(ids(split_batches(&rpms, limits)), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_unbounded_single_chunk() {
        let rpms: Vec<_> = (1..=30).map(|i| sized(i, 1 << 30)).collect();
        assert_eq!(split_batches(&rpms, BatchLimits::unbounded()).count(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(split_batches(&[], BatchLimits::default()).next(), None);
    }

    #[test]
    fn test_from_config() {
        let limits = BatchLimits::from_config(2, 0);
        assert_eq!(limits.max_size, Some(DEFAULT_MAX_SIZE));
        assert_eq!(limits.max_files, None);
        assert_eq!(BatchLimits::from_config(0, 20).max_size, None);
    }
}
