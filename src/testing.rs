//! Testing utilities shared by this crate's own test suite and available to
//! downstream users exercising their own networks.
//!
//! - **Fixtures**: pre-built test networks for common scenarios
//! - **Builders**: [`GraphBuilder`] for assembling ad hoc small networks
//! - **Assertions**: compare clustering results without caring about module
//!   label identity
//!
//! # Quick Start
//!
//! ```
//! use infomap_engine::testing::{fixtures, assert_same_top_level_clusters};
//! use infomap_engine::{Config, Infomap};
//!
//! let net = fixtures::triangle_bridge();
//! let config = Config::default();
//! let outcome = Infomap::new(config).run(net).unwrap();
//! let leaves = outcome.leaves();
//! assert_same_top_level_clusters(&leaves, &[vec![0, 1, 2], vec![3, 4, 5]]);
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
