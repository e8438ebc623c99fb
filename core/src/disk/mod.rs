//! On-disk partition structures.

pub mod gpt;
pub mod partition;

pub use gpt::{GptHeader, GptPolicy, ParseError};
pub use partition::{PartitionInfo, PartitionTable, PartitionType};
