//! sansim-io: Serialization and file I/O for sansim.
//!
//! This crate provides the JSON wire format for the external model sampler,
//! configuration file loading, and CSV / JSON writers for reduced data.
//!

pub mod config;
mod error;
pub mod wire;
mod writer;

pub use config::{load_averaging, load_config, load_scenarios, parse_config, read_json};
pub use error::{Error, Result};
pub use wire::{decode_response, encode_request, JsonSampler, Transport};
pub use writer::{write_csv, write_json, OutputFormat, ReducedDataWriter};
