//! Testing utilities and harness for Canopy

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
}
