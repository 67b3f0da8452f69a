//! Graph-level algorithms the sampler is assembled from.
//!
//! * [`balance`] partitions the corpus across worker groups.
//! * [`walk`] holds the random-walk traversal primitives.
//! * [`subgraph`] turns a restart-walk trace into an annotated subgraph.
//! * [`positional`] computes the spectral positional features of a subgraph.

pub mod balance;
pub mod positional;
pub mod subgraph;
pub mod walk;
