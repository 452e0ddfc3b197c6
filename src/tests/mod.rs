//! Integration-style tests that need a live collaborator, run manually:
//! gated behind an env var and `#[ignore]`d, not part of the default
//! `cargo test` run.

mod db_bisection;
