//! Common imports for Finch tests.

pub use crate::init;

pub use color_eyre::eyre;
pub use eyre::Result;

pub use tracing::{debug, error, info, trace, warn};
