//! Command-line definitions live in the `collision-dash-cli` crate so that
//! `build.rs` can render the man page from them.

pub use collision_dash_cli::*;
