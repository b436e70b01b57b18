// crates/babel-store/src/lib.rs
//
// babel-store: Storage layer for the Babel Protocol.
//
// The durable store is an external collaborator; this crate provides the
// in-memory reference implementation of the `ContentStore` trait used by the
// daemon in single-node mode and by tests.

pub mod memory;

pub use memory::InMemoryStore;
