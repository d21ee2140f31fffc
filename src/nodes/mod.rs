//! Discovered Art-Net nodes
//!
//! Learned from ArtPollReply packets and keyed by the sender's IP. Entries
//! are overwritten on every reply and never expire while the controller
//! runs.

pub mod registry;

pub use registry::{NodeInfo, NodeRegistry};
