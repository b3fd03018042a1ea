use batched_sort::SortConfig;

/// One way of running the engine the generic suite in [`tests`] is instantiated for.
pub trait Sort {
    fn name() -> String;

    /// Engine configuration, usually one that forces a single strategy.
    fn config() -> SortConfig;

    /// Whether requests demand stable results.
    fn stable() -> bool {
        false
    }
}

pub mod patterns;
