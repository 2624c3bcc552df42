pub mod parallel;

pub use parallel::{parallel_for, parallel_for_slices};
