pub mod utils;

pub use utils::test_utils;

mod analytics;
mod tenancy;
