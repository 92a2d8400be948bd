//! Partitioning of objects into transfer parts

use cloudstore_crypto::BLOCK_SIZE;

/// Chunk size used when none is requested
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default chunk sizes grow until an object fits in fewer parts than this
pub const MAX_PARTS: u64 = 10_000;

/// One contiguous byte range of a transfer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part {
    /// 0-based position in the plan
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl Part {
    /// 1-based multipart part number
    pub fn part_number(&self) -> u32 {
        u32::try_from(self.index + 1).unwrap_or(u32::MAX)
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered, gap-free partition of an object into parts
#[derive(Clone, Debug)]
pub struct TransferPlan {
    object_key: String,
    total_size: u64,
    chunk_size: u64,
    parts: Vec<Part>,
}

impl TransferPlan {
    /// Cut `total_size` bytes into `chunk_size` parts, the last one shorter.
    /// Without multipart, or when the object fits in one chunk, the plan has
    /// a single part covering the whole object (empty objects included).
    pub fn new(
        object_key: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
        multipart: bool,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        let parts = if !multipart || total_size <= chunk_size {
            vec![Part {
                index: 0,
                offset: 0,
                length: total_size,
            }]
        } else {
            let count = total_size.div_ceil(chunk_size);
            (0..count)
                .map(|i| {
                    let offset = i * chunk_size;
                    Part {
                        index: i as usize,
                        offset,
                        length: chunk_size.min(total_size - offset),
                    }
                })
                .collect()
        };

        Self {
            object_key: object_key.into(),
            total_size,
            chunk_size,
            parts,
        }
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    pub fn is_multipart(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn is_last(&self, part: &Part) -> bool {
        part.index + 1 == self.parts.len()
    }
}

/// Default chunk size for a file: 5 MiB, grown by half until the file
/// needs fewer than [`MAX_PARTS`] parts.
pub fn default_chunk_size(file_size: u64) -> u64 {
    let mut chunk = DEFAULT_CHUNK_SIZE;
    while file_size / chunk >= MAX_PARTS {
        chunk += chunk / 2;
    }
    chunk
}

/// Chunk size actually used for an upload. Requests below the store's
/// minimum part size are raised to it; encrypted uploads are rounded up to
/// a whole number of cipher blocks.
pub fn effective_chunk_size(
    requested: Option<u64>,
    file_size: u64,
    min_part_size: u64,
    encrypted: bool,
) -> u64 {
    let chunk = requested
        .unwrap_or_else(|| default_chunk_size(file_size))
        .max(min_part_size)
        .max(1);
    if encrypted {
        chunk.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
    } else {
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(plan: &TransferPlan) {
        let mut next = 0;
        for (i, part) in plan.parts().iter().enumerate() {
            assert_eq!(part.index, i);
            assert_eq!(part.offset, next);
            next = part.end();
        }
        assert_eq!(next, plan.total_size());
    }

    #[test]
    fn test_even_and_uneven_splits() {
        let plan = TransferPlan::new("k", 100, 25, true);
        assert_eq!(plan.part_count(), 4);
        assert_partition(&plan);

        let plan = TransferPlan::new("k", 101, 25, true);
        assert_eq!(plan.part_count(), 5);
        assert_eq!(plan.parts()[4].length, 1);
        assert!(plan.is_last(&plan.parts()[4]));
        assert_partition(&plan);
    }

    #[test]
    fn test_single_part_cases() {
        let empty = TransferPlan::new("k", 0, 16, true);
        assert_eq!(empty.part_count(), 1);
        assert_eq!(empty.parts()[0].length, 0);

        let small = TransferPlan::new("k", 10, 16, true);
        assert!(!small.is_multipart());

        let no_multipart = TransferPlan::new("k", 1000, 16, false);
        assert_eq!(no_multipart.part_count(), 1);
        assert_eq!(no_multipart.parts()[0].length, 1000);
    }

    #[test]
    fn test_part_numbers_are_one_based() {
        let plan = TransferPlan::new("k", 30, 10, true);
        let numbers: Vec<u32> = plan.parts().iter().map(Part::part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_default_chunk_size_growth() {
        assert_eq!(default_chunk_size(0), DEFAULT_CHUNK_SIZE);
        assert_eq!(default_chunk_size(1024), DEFAULT_CHUNK_SIZE);

        let huge = 100 * 1024 * 1024 * 1024;
        let chunk = default_chunk_size(huge);
        assert!(chunk > DEFAULT_CHUNK_SIZE);
        assert!(huge / chunk < MAX_PARTS);
    }

    #[test]
    fn test_effective_chunk_size() {
        assert_eq!(effective_chunk_size(Some(10), 100, 64, false), 64);
        assert_eq!(effective_chunk_size(Some(100), 100, 1, false), 100);
        assert_eq!(effective_chunk_size(Some(100), 100, 1, true), 112);
        assert_eq!(effective_chunk_size(None, 100, 1, true), DEFAULT_CHUNK_SIZE);
    }
}
