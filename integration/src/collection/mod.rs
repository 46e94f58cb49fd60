//! Fast collection type aliases shared across the engine crates.
//!
//! Positions, order books, and offset tables are all keyed by small strings
//! (symbols, consumer ids) and read far more often than written, so we reach
//! for an FNV-hashed `IndexMap` instead of the default SipHash `HashMap`.

/// Fast `IndexMap` using the FNV hasher, good for small string/int keys.
pub type FnvIndexMap<K, V> = indexmap::IndexMap<K, V, fnv::FnvBuildHasher>;

/// Fast `IndexSet` using the FNV hasher.
pub type FnvIndexSet<T> = indexmap::IndexSet<T, fnv::FnvBuildHasher>;
