mod plan;

pub use plan::{JitterStrategy, RetryPlan};
