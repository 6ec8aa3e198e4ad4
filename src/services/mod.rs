//! Domain services used by the connection protocol.
//!
//! Service functions own board and registry mutation so the protocol layer
//! can stay focused on grammar validation and response formatting.

pub mod board;
