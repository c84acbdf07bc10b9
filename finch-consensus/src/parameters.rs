//! Constants the consensus checks depend on.

pub mod subsidy;
