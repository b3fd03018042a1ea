use std::env;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::error::{Result, SortError};

/// Tuning constants of the strategy selection.
///
/// The defaults were measured, not derived. They are exposed so they can be re-tuned per target,
/// and so tests can force any strategy for any shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortConfig {
    /// Longest slice handled by the in-place network for keys narrower than 8 bytes.
    pub small_sort_max_len: usize,
    /// Longest slice handled by the in-place network for 8 byte keys.
    pub small_sort_max_len_wide_key: usize,
    /// Widest compare-exchange network the in-place sorter can run, a power of two.
    pub bitonic_max_width: usize,
    /// Batches with at least this many segments use the true segmented sort.
    pub segmented_min_segments: usize,
    /// Upper bound on the elements processed by one batch.
    pub max_batch_elements: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            small_sort_max_len: 2048,
            small_sort_max_len_wide_key: 1024,
            bitonic_max_width: 2048,
            segmented_min_segments: 128,
            max_batch_elements: i32::MAX as usize,
        }
    }
}

static DEFAULT_CONFIG: Lazy<SortConfig> = Lazy::new(SortConfig::from_env);

impl SortConfig {
    /// The process wide configuration, the defaults with environment overrides applied.
    pub fn global() -> SortConfig {
        *DEFAULT_CONFIG
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_from_env("BATCHED_SORT_SMALL_SORT_MAX_LEN", &mut config.small_sort_max_len);
        override_from_env(
            "BATCHED_SORT_SMALL_SORT_MAX_LEN_WIDE_KEY",
            &mut config.small_sort_max_len_wide_key,
        );
        override_from_env(
            "BATCHED_SORT_SEGMENTED_MIN_SEGMENTS",
            &mut config.segmented_min_segments,
        );
        override_from_env(
            "BATCHED_SORT_MAX_BATCH_ELEMENTS",
            &mut config.max_batch_elements,
        );

        config
    }

    /// Never routes to the in-place network.
    pub fn without_small_sort(mut self) -> Self {
        self.small_sort_max_len = 0;
        self.small_sort_max_len_wide_key = 0;
        self
    }

    pub fn with_segmented_min_segments(mut self, segments: usize) -> Self {
        self.segmented_min_segments = segments;
        self
    }

    pub fn with_max_batch_elements(mut self, elements: usize) -> Self {
        self.max_batch_elements = elements;
        self
    }

    /// Longest slice the in-place network takes for a key of this width.
    pub fn small_sort_limit(&self, wide_key: bool) -> usize {
        let limit = if wide_key {
            self.small_sort_max_len_wide_key
        } else {
            self.small_sort_max_len
        };
        limit.min(self.bitonic_max_width)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_elements == 0 {
            return Err(SortError::InvalidArgument(
                "max_batch_elements must be at least 1".into(),
            ));
        }
        if !self.bitonic_max_width.is_power_of_two() {
            return Err(SortError::InvalidArgument(format!(
                "bitonic_max_width must be a power of two, got {}",
                self.bitonic_max_width
            )));
        }
        Ok(())
    }
}

fn override_from_env<T: FromStr + std::fmt::Debug>(var: &str, field: &mut T) {
    let Ok(raw) = env::var(var) else {
        return;
    };

    match T::from_str(raw.trim()) {
        Ok(value) => {
            log::debug!("{var} overrides the default of {field:?} with {value:?}");
            *field = value;
        }
        Err(_) => log::warn!("ignoring {var}={raw:?}, not a valid value"),
    }
}
