//! Shared fixtures: a scripted in-memory renderer.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use site_tester::renderer::{LoadResult, RenderContext, Renderer};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// What the fake browser saw, in order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub opened: usize,
    pub closed: usize,
    pub init_scripts: Vec<String>,
    /// `(url, markup)` per load.
    pub loads: Vec<(String, String)>,
    /// `src` of every `<script>` left in the loaded markup.
    pub executed_scripts: Vec<String>,
    pub loaded_at: Vec<Instant>,
    pub js_calls: Vec<(String, Instant)>,
    pub html_reads: Vec<Instant>,
}

/// How the fake page behaves.
#[derive(Debug, Clone)]
pub enum LoadBehavior {
    /// Fire the load event after this (virtual) delay.
    After(Duration),
    /// Never fire the load event.
    Hang,
    /// Fail the navigation.
    Fail,
}

/// Renderer whose pages serve the loaded markup back unchanged.
#[derive(Clone)]
pub struct ScriptedRenderer {
    pub recorder: Arc<Mutex<Recorder>>,
    load: LoadBehavior,
    js_result: Value,
    stalls: Stalls,
}

/// Page calls that never return.
#[derive(Debug, Clone, Copy, Default)]
struct Stalls {
    execute_js: bool,
    get_html: bool,
}

impl ScriptedRenderer {
    pub fn new(load: LoadBehavior) -> Self {
        Self {
            recorder: Arc::new(Mutex::new(Recorder::default())),
            load,
            js_result: Value::Bool(true),
            stalls: Stalls::default(),
        }
    }

    pub fn instant() -> Self {
        Self::new(LoadBehavior::After(Duration::ZERO))
    }

    /// Value every `execute_js` call returns.
    pub fn with_js_result(mut self, value: Value) -> Self {
        self.js_result = value;
        self
    }

    /// Make every `execute_js` call hang forever.
    pub fn stall_scripts(mut self) -> Self {
        self.stalls.execute_js = true;
        self
    }

    /// Make every `get_html` call hang forever.
    pub fn stall_snapshot(mut self) -> Self {
        self.stalls.get_html = true;
        self
    }

    pub fn recorded<R>(&self, f: impl FnOnce(&Recorder) -> R) -> R {
        f(&self.recorder.lock().unwrap())
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.recorder.lock().unwrap().opened += 1;
        Ok(Box::new(ScriptedContext {
            recorder: Arc::clone(&self.recorder),
            load: self.load.clone(),
            js_result: self.js_result.clone(),
            stalls: self.stalls,
            markup: String::new(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        let r = self.recorder.lock().unwrap();
        r.opened - r.closed
    }
}

struct ScriptedContext {
    recorder: Arc<Mutex<Recorder>>,
    load: LoadBehavior,
    js_result: Value,
    stalls: Stalls,
    markup: String,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn add_init_script(&mut self, source: &str) -> Result<()> {
        self.recorder.lock().unwrap().init_scripts.push(source.to_string());
        Ok(())
    }

    async fn load(&mut self, url: &str, markup: &str) -> Result<LoadResult> {
        match self.load.clone() {
            LoadBehavior::After(delay) => tokio::time::sleep(delay).await,
            LoadBehavior::Hang => std::future::pending::<()>().await,
            LoadBehavior::Fail => anyhow::bail!("net::ERR_NAME_NOT_RESOLVED"),
        }

        let src = Regex::new(r#"<script[^>]*\bsrc="([^"]+)""#).unwrap();
        let mut r = self.recorder.lock().unwrap();
        r.loads.push((url.to_string(), markup.to_string()));
        r.executed_scripts
            .extend(src.captures_iter(markup).map(|c| c[1].to_string()));
        r.loaded_at.push(Instant::now());
        self.markup = markup.to_string();

        Ok(LoadResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        self.recorder
            .lock()
            .unwrap()
            .js_calls
            .push((script.to_string(), Instant::now()));
        if self.stalls.execute_js {
            std::future::pending::<()>().await;
        }
        Ok(self.js_result.clone())
    }

    async fn get_html(&self) -> Result<String> {
        self.recorder.lock().unwrap().html_reads.push(Instant::now());
        if self.stalls.get_html {
            std::future::pending::<()>().await;
        }
        Ok(self.markup.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.recorder.lock().unwrap().closed += 1;
        Ok(())
    }
}
