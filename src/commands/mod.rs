//! # CLI Command Implementations
//!
//! One module per subcommand. Each defines an `Args` struct derived with
//! `clap` and an `execute` function that maps those arguments onto the
//! `repo_file_sync` library.
//!
//! Environment fallbacks (`INPUT_*`, `GITHUB_*`, `TEST_MODE`) are declared on
//! the argument structs, so this is the only layer that sees the process
//! environment.

pub mod completions;
pub mod sync;
pub mod validate;
