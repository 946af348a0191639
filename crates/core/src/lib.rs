#![forbid(unsafe_code)]

mod claim;
mod hash;
mod ids;
mod job;
mod merkle;
mod profile;
mod ranges;
mod receipt;
mod verify;

pub use claim::*;
pub use hash::*;
pub use ids::*;
pub use job::*;
pub use merkle::*;
pub use profile::*;
pub use ranges::*;
pub use receipt::*;
pub use verify::*;

#[cfg(test)]
mod tests;
