// Copyright 2026 Site Tester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for live run telemetry.
//!
//! The orchestrator and runners emit `ProgressEvent`s that flow through a
//! `tokio::sync::broadcast` channel to any subscriber (the terminal
//! renderer, tests). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{Channel, Verdict};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event. `index` is the descriptor's
/// zero-based position in the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    RunStarted { total: usize },
    TargetStarted { index: usize, name: String },
    TargetSkipped { index: usize, name: String },
    ChannelStarted {
        index: usize,
        channel: Channel,
        url: String,
        wait_ms: u64,
    },
    StageEntered {
        index: usize,
        channel: Channel,
        stage: SiteStage,
    },
    ChannelFinished {
        index: usize,
        channel: Channel,
        verdict: Verdict,
        error: Option<String>,
    },
    TargetFinished { index: usize },
    RunComplete {
        total: usize,
        failed: usize,
        duration_ms: u64,
    },
}

/// States of one site check. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteStage {
    Fetching,
    Transforming,
    Rendering,
    Waiting,
    Evaluating,
    Done,
}

impl fmt::Display for SiteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching => write!(f, "fetching"),
            Self::Transforming => write!(f, "transforming"),
            Self::Rendering => write!(f, "rendering"),
            Self::Waiting => write!(f, "waiting"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Stamps events with the run id and sequence number before sending.
pub struct ProgressEmitter {
    tx: Option<ProgressSender>,
    run_id: String,
    seq: AtomicU64,
}

impl ProgressEmitter {
    pub fn new(tx: Option<ProgressSender>, run_id: impl Into<String>) -> Self {
        Self {
            tx,
            run_id: run_id.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// An emitter with no channel; every event is dropped.
    pub fn disabled() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.clone(),
                seq,
                event,
            });
        }
    }
}
