//! Scripted query execution for tests and demos
//!
//! Behaves like the production engine at the cursor seam without running a
//! real query: the script decides which blocks appear, where the execution
//! suspends, and where it fails. A [`MockQueryHandle`] drives suspension
//! points and observes kills from the test side.

use crate::{ItemBlock, QueryError, QueryExecution, Result, Step};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// One scripted behaviour of a [`MockQuery`]
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Produce a block with these rows
    Block(Vec<Value>),

    /// Report `Waiting` until the handle resumes the execution
    Suspend,

    /// Fail with an execution error
    Fail(String),
}

/// State shared between a mock query and its handle
struct Shared {
    wakeup: Mutex<Option<Arc<Notify>>>,
    resumes: AtomicUsize,
    killed: AtomicBool,
    steps: AtomicUsize,
}

impl Shared {
    fn signal_wakeup(&self) {
        // Clone out so the lock is not held across the notify
        let wakeup = self.wakeup.lock().clone();
        if let Some(wakeup) = wakeup {
            wakeup.notify_waiters();
        }
    }
}

/// Scripted in-memory execution
pub struct MockQuery {
    script: VecDeque<ScriptedStep>,
    shared: Arc<Shared>,
}

impl MockQuery {
    /// Execution that plays back the given script, then reports exhaustion
    pub fn new(script: Vec<ScriptedStep>) -> Self {
        Self {
            script: script.into(),
            shared: Arc::new(Shared {
                wakeup: Mutex::new(None),
                resumes: AtomicUsize::new(0),
                killed: AtomicBool::new(false),
                steps: AtomicUsize::new(0),
            }),
        }
    }

    /// Execution producing `rows` in blocks of `block_size`, no suspensions
    pub fn from_rows(rows: Vec<Value>, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let script = rows
            .chunks(block_size)
            .map(|chunk| ScriptedStep::Block(chunk.to_vec()))
            .collect();
        Self::new(script)
    }

    /// Handle for driving this execution from a test
    pub fn handle(&self) -> MockQueryHandle {
        MockQueryHandle {
            shared: self.shared.clone(),
        }
    }

    fn try_consume_resume(&self) -> bool {
        self.shared
            .resumes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl QueryExecution for MockQuery {
    fn step(&mut self) -> Result<Step> {
        self.shared.steps.fetch_add(1, Ordering::SeqCst);

        loop {
            if self.shared.killed.load(Ordering::SeqCst) {
                return Err(QueryError::Killed);
            }

            let Some(next) = self.script.pop_front() else {
                return Ok(Step::Exhausted);
            };

            match next {
                ScriptedStep::Block(rows) => return Ok(Step::Block(ItemBlock::new(rows))),
                ScriptedStep::Fail(message) => return Err(QueryError::Execution(message)),
                ScriptedStep::Suspend => {
                    if self.try_consume_resume() {
                        continue;
                    }
                    // Still suspended; keep the step for the next attempt
                    self.script.push_front(ScriptedStep::Suspend);
                    return Ok(Step::Waiting);
                }
            }
        }
    }

    fn kill(&mut self) {
        self.shared.killed.store(true, Ordering::SeqCst);
        // Wake suspended callers so they observe the kill
        self.shared.signal_wakeup();
    }

    fn set_wakeup(&mut self, wakeup: Arc<Notify>) {
        *self.shared.wakeup.lock() = Some(wakeup);
    }
}

/// Test-side handle to a [`MockQuery`]
#[derive(Clone)]
pub struct MockQueryHandle {
    shared: Arc<Shared>,
}

impl MockQueryHandle {
    /// Allow the execution past its next suspension point
    pub fn resume(&self) {
        self.shared.resumes.fetch_add(1, Ordering::SeqCst);
        self.shared.signal_wakeup();
    }

    /// Whether the execution has observed a kill request
    pub fn was_killed(&self) -> bool {
        self.shared.killed.load(Ordering::SeqCst)
    }

    /// Number of `step` calls made so far
    pub fn steps(&self) -> usize {
        self.shared.steps.load(Ordering::SeqCst)
    }
}
