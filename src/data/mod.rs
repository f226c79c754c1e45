//! Data provider
//!
//! Loading the diamonds CSV, fetching it from the public seaborn mirror,
//! separating features from the price target, seeded train/test splitting and
//! a deterministic synthetic generator for tests and benchmarks.

mod loader;
mod split;
mod synthetic;

pub use loader::{download_diamonds, load_diamonds, write_csv, DIAMONDS_URL};
pub use split::{
    split_features_target, train_test_split, TrainTestSplit, MIN_TEST_ROWS, MIN_TRAIN_ROWS,
};
pub use synthetic::generate_diamonds;
