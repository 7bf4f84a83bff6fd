// Copyright 2026 Site Tester Contributors
// SPDX-License-Identifier: Apache-2.0

//! site-tester command line: descriptor loading, terminal output, exit codes.

pub mod config;
pub mod exit;
pub mod output;
pub mod run;

pub use config::{load_targets, resolve_sites_dir, OutputOptions, Settings};
pub use exit::ExitCode;
