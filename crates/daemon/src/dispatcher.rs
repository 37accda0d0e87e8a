use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use crate::config::WatchConfig;
use crate::error::{PlanError, PromptError};
use crate::prompt::{is_affirmative, ConfirmationInput};
use crate::supervisor::{BatchReport, BatchSupervisor};

/// What became of one watch event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Under the target directory; never processed
    SelfExcluded,
    /// Not the configured media extension
    OtherExtension,
    /// Operator said no, or the console is gone
    Declined,
    Converted(BatchReport),
}

/// Routes watcher events through filtering and confirmation into batches.
pub struct Dispatcher {
    target_dir: PathBuf,
    extension: String,
    require_confirmation: bool,
    prompter: Arc<dyn ConfirmationInput>,
    supervisor: Arc<BatchSupervisor>,
}

impl Dispatcher {
    pub fn new(
        cfg: &WatchConfig,
        prompter: Arc<dyn ConfirmationInput>,
        supervisor: Arc<BatchSupervisor>,
    ) -> Self {
        Self {
            target_dir: cfg.target_dir.clone(),
            extension: cfg.normalized_extension(),
            require_confirmation: cfg.require_confirmation,
            prompter,
            supervisor,
        }
    }

    fn has_media_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase() == self.extension)
            .unwrap_or(false)
    }

    async fn confirm(&self, path: &Path) -> bool {
        if !self.require_confirmation {
            return true;
        }
        match self.prompter.ask(format!("Convert {}? (y/n)", path.display())).await {
            Ok(answer) if is_affirmative(&answer) => true,
            Ok(answer) => {
                info!("Skipping {} (answered '{}')", path.display(), answer.trim());
                false
            }
            Err(PromptError::Closed) => {
                info!("Skipping {}: confirmation input closed", path.display());
                false
            }
        }
    }

    /// Handle one "file added" event from start to batch completion.
    pub async fn handle_event(&self, path: &Path) -> Result<EventOutcome, PlanError> {
        // Our own outputs land here; reacting to them would loop forever.
        if path.starts_with(&self.target_dir) {
            debug!("Ignoring file in target directory: {}", path.display());
            return Ok(EventOutcome::SelfExcluded);
        }
        if !self.has_media_extension(path) {
            debug!("Ignoring non-.{} file: {}", self.extension, path.display());
            return Ok(EventOutcome::OtherExtension);
        }

        info!("New video file detected: {}", path.display());
        if !self.confirm(path).await {
            return Ok(EventOutcome::Declined);
        }

        info!("Converting {}", path.display());
        let report = self.supervisor.run_batch(path).await?;
        Ok(EventOutcome::Converted(report))
    }

    /// Consume events until the watcher side closes, then drain in-flight work.
    ///
    /// Each event runs in its own task so that a pending question does not
    /// hold up the next file. Task errors and panics are logged here.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<PathBuf>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(path) => {
                        let this = Arc::clone(&self);
                        tasks.spawn(async move {
                            let outcome = this.handle_event(&path).await;
                            (path, outcome)
                        });
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        }

        debug!("Watch event stream ended, waiting for {} in-flight event(s)", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            reap(joined);
        }
    }
}

fn reap(joined: Result<(PathBuf, Result<EventOutcome, PlanError>), JoinError>) {
    match joined {
        Ok((_, Ok(EventOutcome::SelfExcluded | EventOutcome::OtherExtension))) => return,
        Ok((_, Ok(_))) => {}
        Ok((path, Err(e))) => error!("Failed to handle {}: {}", path.display(), e),
        Err(e) => error!("Event task died: {}", e),
    }
    info!("Waiting for new files...");
}
