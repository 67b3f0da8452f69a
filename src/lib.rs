pub mod algorithms;
pub mod config;
pub mod corpus_io;
pub mod dataset;
pub mod errors;
pub mod sampler;
pub mod types;
pub mod util;
pub mod worker;
