//! Arena indices for the trees built by the compiler.
//!
//! Trees with back-references (a block's parent, a scheduling unit's source
//! statement) store their nodes in an [`IndexedMap`] and refer to each other
//! through typed indices instead of pointers.
mod index_trait;
mod indexed_map;
mod macros;

pub use index_trait::IndexRef;
pub use indexed_map::IndexedMap;
