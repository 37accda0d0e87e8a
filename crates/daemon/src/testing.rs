//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::engine::{EngineEvent, EngineProgress, EngineRequest, ProgressSink, TranscodeEngine};
use crate::error::{EngineError, PromptError};
use crate::prompt::ConfirmationInput;

/// Behaviour of one fake engine call, keyed by output file name.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub delay: Duration,
    pub progress: Vec<EngineProgress>,
    pub failure: Option<String>,
    pub panic: bool,
}

impl Script {
    pub fn fail(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn panic() -> Self {
        Self {
            panic: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress(mut self, progress: Vec<EngineProgress>) -> Self {
        self.progress = progress;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub request: EngineRequest,
    pub started_at: Instant,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, Script>,
    default_script: Script,
    calls: Mutex<Vec<Call>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// In-memory engine recording every invocation.
#[derive(Clone, Default)]
pub struct FakeEngine {
    inner: Arc<Inner>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, output_name: &str, script: Script) -> Self {
        self.inner_mut().scripts.insert(output_name.to_string(), script);
        self
    }

    pub fn with_default(mut self, script: Script) -> Self {
        self.inner_mut().default_script = script;
        self
    }

    fn inner_mut(&mut self) -> &mut Inner {
        Arc::get_mut(&mut self.inner).expect("configure FakeEngine before sharing it")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.inner.max_running.load(Ordering::SeqCst)
    }

    fn script_for(&self, output: &Path) -> Script {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.inner
            .scripts
            .get(&name)
            .cloned()
            .unwrap_or_else(|| self.inner.default_script.clone())
    }
}

#[async_trait]
impl TranscodeEngine for FakeEngine {
    async fn transcode(&self, request: EngineRequest, events: ProgressSink) -> Result<(), EngineError> {
        let script = self.script_for(&request.output);
        self.inner.calls.lock().unwrap().push(Call {
            request: request.clone(),
            started_at: Instant::now(),
        });

        let running = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_running.fetch_max(running, Ordering::SeqCst);

        let _ = events.send(EngineEvent::Started {
            command_line: format!("fake {}", request.output.display()),
        });
        for progress in &script.progress {
            let _ = events.send(EngineEvent::Progress(*progress));
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }

        self.inner.running.fetch_sub(1, Ordering::SeqCst);

        if script.panic {
            panic!("scripted engine panic");
        }
        if let Some(message) = script.failure {
            return Err(EngineError::Exit {
                code: 1,
                stderr_tail: message,
            });
        }
        Ok(())
    }
}

/// Output file names of the recorded calls, in call order.
pub fn called_outputs(engine: &FakeEngine) -> Vec<PathBuf> {
    engine
        .calls()
        .into_iter()
        .map(|c| PathBuf::from(c.request.output.file_name().unwrap_or_default()))
        .collect()
}

/// Confirmation input giving the same answer to every question.
#[derive(Default)]
pub struct ScriptedInput {
    answer: Option<String>,
    panic_on: Option<String>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            ..Default::default()
        }
    }

    /// Behaves like a closed console.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Panic when a question mentions `needle`.
    pub fn panic_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationInput for ScriptedInput {
    async fn ask(&self, prompt: String) -> Result<String, PromptError> {
        self.asked.lock().unwrap().push(prompt.clone());
        if let Some(needle) = &self.panic_on {
            if prompt.contains(needle.as_str()) {
                panic!("scripted prompt panic");
            }
        }
        self.answer.clone().ok_or(PromptError::Closed)
    }
}
