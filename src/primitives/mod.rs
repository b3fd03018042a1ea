//! Parallel primitives the sort strategies are built from, a host rendition of the vendor
//! library routines (device wide radix sort, segmented radix sort).

mod radix;
mod segmented;

pub use radix::{radix_sort_keys, radix_sort_pairs};
pub use segmented::segmented_sort_pairs;
