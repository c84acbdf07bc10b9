//! Proof-of-work types.
//!
//! Note that Finch's core does not *validate* proof of work; it only needs to
//! accumulate the work represented by each header so the chain database can
//! track the best tip.

pub mod difficulty;
