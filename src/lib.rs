//! Concentration curves for repeatedly dosed substances
//!
//! Each substance decays with first-order kinetics (a fixed half-life). Doses
//! superpose, and the curve builder samples the total over a time window densely
//! enough that the plotted line stays faithful at any zoom level.

pub mod models;
pub mod decay;
pub mod sampler;
pub mod curve;
pub mod state;
pub mod summary;
pub mod parser;
pub mod output;
pub mod example_data;
pub mod errors;

pub use models::*;
pub use decay::{decay, total_at, totals_along};
pub use sampler::{AdaptiveSampler, SamplingPlan};
pub use curve::CurveBuilder;
pub use errors::*;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, DecayError>;
