//! The three sorting strategies and the policy that picks between them.
//!
//! Every strategy produces the same values: all of them order elements by
//! [`SortKey::radix_key`]. They differ in cost profile and in how ties end up ordered in the
//! indices.

pub(crate) mod full_sort;
pub(crate) mod segmented;
pub(crate) mod small;

use std::fmt;

use crate::config::SortConfig;
use crate::device::{Device, DeviceBuffer, Stream};
use crate::dtype::SortKey;
use crate::error::Result;
use crate::index_width::IndexWidth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortStrategy {
    /// Bitonic compare-exchange network run in place on every slice, one block per slice.
    InPlace,
    /// Two global radix sorts: by key, then stably by segment id.
    FullSort,
    /// One segmented radix sort over per-slice offset ranges.
    Segmented,
}

/// Slice count and slice length of a run of whole slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchShape {
    pub nsegments: usize,
    pub nsort: usize,
}

impl BatchShape {
    pub fn numel(&self) -> usize {
        self.nsegments * self.nsort
    }
}

/// Candidates for a whole request, in order of preference.
pub(crate) const REQUEST_STRATEGIES: [SortStrategy; 3] = [
    SortStrategy::InPlace,
    SortStrategy::Segmented,
    SortStrategy::FullSort,
];

/// Candidates for one batch of a request that is too long for the in-place network.
pub(crate) const BATCH_STRATEGIES: [SortStrategy; 2] =
    [SortStrategy::Segmented, SortStrategy::FullSort];

impl SortStrategy {
    pub fn name(self) -> &'static str {
        match self {
            SortStrategy::InPlace => "in_place",
            SortStrategy::FullSort => "full_sort",
            SortStrategy::Segmented => "segmented",
        }
    }

    pub fn applicable(
        self,
        shape: BatchShape,
        stable: bool,
        wide_key: bool,
        config: &SortConfig,
    ) -> bool {
        match self {
            SortStrategy::InPlace => !stable && shape.nsort <= config.small_sort_limit(wide_key),
            SortStrategy::Segmented => shape.nsegments >= config.segmented_min_segments,
            SortStrategy::FullSort => true,
        }
    }

    /// The first of `candidates` applicable to `shape`. The list always ends in
    /// [`SortStrategy::FullSort`], which takes anything.
    pub fn select(
        candidates: &[SortStrategy],
        shape: BatchShape,
        stable: bool,
        wide_key: bool,
        config: &SortConfig,
    ) -> SortStrategy {
        candidates
            .iter()
            .copied()
            .find(|s| s.applicable(shape, stable, wide_key, config))
            .unwrap_or(SortStrategy::FullSort)
    }
}

impl fmt::Display for SortStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `shape.numel()` elements of `buffer` starting at element `start`.
pub(crate) struct Span<T> {
    pub(crate) buffer: DeviceBuffer<T>,
    pub(crate) start: usize,
}

impl<T> Clone for Span<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            start: self.start,
        }
    }
}

/// Working memory shared by every batch of one request.
///
/// Sized for the largest batch and reused batch after batch: launches on one stream run in
/// order, so a batch only touches the scratch once the previous batch is done with it. Each
/// strategy uses the leading `numel` elements.
#[derive(Clone)]
pub(crate) struct Scratch {
    /// Segment tags of the full-sort strategy, origin positions of the segmented one.
    pub(crate) tags: DeviceBuffer<i64>,
    /// Second tag buffer, only non-empty when a batch runs the full-sort strategy.
    pub(crate) sorted_tags: DeviceBuffer<i64>,
}

impl Scratch {
    pub(crate) fn allocate(
        device: &Device,
        batches: impl IntoIterator<Item = (BatchShape, SortStrategy)>,
    ) -> Result<Self> {
        let (mut tags, mut sorted_tags) = (0, 0);
        for (shape, strategy) in batches {
            tags = tags.max(shape.numel());
            if strategy == SortStrategy::FullSort {
                sorted_tags = sorted_tags.max(shape.numel());
            }
        }

        Ok(Self {
            tags: device.allocate(tags)?,
            sorted_tags: device.allocate(sorted_tags)?,
        })
    }
}

/// One batch of a segmented-path request. All three spans are dense, slice after slice.
pub(crate) struct Batch<T> {
    pub(crate) input: Span<T>,
    pub(crate) values: Span<T>,
    pub(crate) indices: Span<i64>,
    pub(crate) scratch: Scratch,
    pub(crate) shape: BatchShape,
    pub(crate) descending: bool,
    pub(crate) width: IndexWidth,
}

impl<T: SortKey> Batch<T> {
    /// Enqueues the work of `strategy` for this batch on `stream`.
    pub(crate) fn execute(&self, stream: &Stream, strategy: SortStrategy) -> Result<()> {
        match strategy {
            SortStrategy::FullSort => full_sort::execute(stream, self),
            SortStrategy::Segmented => segmented::execute(stream, self),
            SortStrategy::InPlace => unreachable!("the in-place network never runs per batch"),
        }
    }
}
