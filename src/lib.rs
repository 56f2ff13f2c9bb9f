//! The dependency-graph core of a ninja-compatible build system: nodes and
//! edges, path interning, recipe hashing, and the bookkeeping shared by the
//! manifest loader, the scheduler, and the persisted logs.

pub mod densemap;
pub mod env;
pub mod escape;
pub mod fs;
pub mod graph;
pub mod hash;
pub mod smallmap;
