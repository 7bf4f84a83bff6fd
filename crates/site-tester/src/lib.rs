// Copyright 2026 Site Tester Contributors
// SPDX-License-Identifier: Apache-2.0

//! site-tester: render sites and APIs and evaluate health predicates.
//!
//! Each target is fetched, optionally transformed, rendered in a real
//! browser (or parsed as JSON), and tested by a predicate whose failures are
//! contained. Targets run strictly one after another.

pub mod api;
pub mod context;
pub mod document;
pub mod http;
pub mod orchestrator;
pub mod polyfill;
pub mod predicate;
pub mod progress;
pub mod renderer;
pub mod report;
pub mod site;
pub mod treat;
pub mod types;

pub use api::run_api_check;
pub use context::{CheckContext, RunOptions};
pub use document::Document;
pub use http::HttpClient;
pub use orchestrator::{needs_renderer, Orchestrator};
pub use predicate::{evaluate, ApiTest, Evaluation, JsonAssertion, SelectorTest, SiteTest};
pub use renderer::chromium::{ChromiumOptions, ChromiumRenderer};
pub use renderer::{NoopRenderer, RenderContext, Renderer};
pub use report::{FailureDigest, RunReport};
pub use site::{render_site, run_site_check};
pub use treat::Treat;
pub use types::*;
