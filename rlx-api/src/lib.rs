pub mod registry;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use registry::{
    CONTINUOUS_ALGORITHMS, DISCRETE_ALGORITHMS, continuous_algorithm, discrete_algorithm,
};
