use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::PromptError;

/// Operator confirmation seam.
///
/// Several questions may be outstanding at once and their answers may come
/// back in any order.
#[async_trait]
pub trait ConfirmationInput: Send + Sync {
    async fn ask(&self, prompt: String) -> Result<String, PromptError>;
}

/// `y` or `yes`, any case.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Split an input line into an optional prompt id and the answer text.
///
/// `3 yes` and `#3 yes` address prompt 3; anything else is a bare answer.
pub fn parse_answer_line(line: &str) -> (Option<u64>, &str) {
    let line = line.trim();
    if let Some((head, rest)) = line.split_once(char::is_whitespace) {
        if let Ok(id) = head.trim_start_matches('#').parse::<u64>() {
            return (Some(id), rest.trim());
        }
    }
    (None, line)
}

#[derive(Default)]
struct RouterState {
    next_id: u64,
    pending: VecDeque<(u64, oneshot::Sender<String>)>,
    closed: bool,
}

impl RouterState {
    fn route(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match parse_answer_line(line) {
            (Some(id), answer) => match self.pending.iter().position(|(pid, _)| *pid == id) {
                Some(pos) => {
                    if let Some((_, tx)) = self.pending.remove(pos) {
                        let _ = tx.send(answer.to_string());
                    }
                }
                None => warn!("No pending question #{}, ignoring answer '{}'", id, answer),
            },
            (None, answer) => match self.pending.pop_front() {
                Some((id, tx)) => {
                    debug!("Bare answer '{}' goes to question #{}", answer, id);
                    let _ = tx.send(answer.to_string());
                }
                None => debug!("No pending question, ignoring input '{}'", answer),
            },
        }
    }

    fn close(&mut self) {
        self.closed = true;
        // Dropping the senders wakes every waiter with `Closed`.
        self.pending.clear();
    }
}

type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Unpin + Send>>>;

/// Console confirmation with id-tagged questions.
///
/// Each question is printed as `[#id] <prompt>`. A reader task routes input
/// lines to the question they address, or to the oldest one when no id is
/// given. End of input closes the router.
#[derive(Clone)]
pub struct PromptRouter {
    state: Arc<Mutex<RouterState>>,
    writer: SharedWriter,
    reader_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PromptRouter {
    /// Start routing answers read from `input`; questions go to `output`.
    pub fn spawn<R, W>(input: R, output: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = Arc::new(Mutex::new(RouterState::default()));

        let reader_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => lock(&reader_state).route(&line),
                    Ok(None) => {
                        debug!("Confirmation input reached end of file");
                        break;
                    }
                    Err(e) => {
                        warn!("Failed to read confirmation input: {}", e);
                        break;
                    }
                }
            }
            lock(&reader_state).close();
        });

        Self {
            state,
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(output))),
            reader_task: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Resolve all outstanding and future questions with `Closed`.
    pub fn close(&self) {
        lock(&self.state).close();
        if let Some(handle) = lock(&self.reader_task).take() {
            handle.abort();
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

#[async_trait]
impl ConfirmationInput for PromptRouter {
    async fn ask(&self, prompt: String) -> Result<String, PromptError> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = lock(&self.state);
            if state.closed {
                return Err(PromptError::Closed);
            }
            state.next_id += 1;
            let id = state.next_id;
            state.pending.push_back((id, tx));
            id
        };

        let line = format!("[#{}] {}\n", id, prompt);
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("Failed to write question #{}: {}", id, e);
        }
        let _ = writer.flush().await;
        drop(writer);

        rx.await.map_err(|_| PromptError::Closed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, BufReader, DuplexStream};

    struct Console {
        router: PromptRouter,
        input: DuplexStream,
        output: tokio::io::Lines<BufReader<DuplexStream>>,
    }

    fn console() -> Console {
        let (input, router_in) = duplex(4096);
        let (router_out, output) = duplex(4096);
        Console {
            router: PromptRouter::spawn(BufReader::new(router_in), router_out),
            input,
            output: BufReader::new(output).lines(),
        }
    }

    async fn next_question(console: &mut Console) -> String {
        tokio::time::timeout(Duration::from_secs(5), console.output.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_affirmative_answers() {
        for yes in ["y", "Y", "yes", " YES ", "Yes"] {
            assert!(is_affirmative(yes), "{}", yes);
        }
        for no in ["n", "no", "", "yep", "yess", "1"] {
            assert!(!is_affirmative(no), "{}", no);
        }
    }

    #[test]
    fn test_parse_answer_line() {
        assert_eq!(parse_answer_line("3 yes"), (Some(3), "yes"));
        assert_eq!(parse_answer_line("#12   n "), (Some(12), "n"));
        assert_eq!(parse_answer_line("y"), (None, "y"));
        assert_eq!(parse_answer_line("  yes please "), (None, "yes please"));
        assert_eq!(parse_answer_line("7"), (None, "7"));
    }

    #[tokio::test]
    async fn test_answers_routed_by_id() {
        let mut console = console();

        let first = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("Convert a.mp4? (y/n)".to_string()).await }
        });
        assert_eq!(next_question(&mut console).await, "[#1] Convert a.mp4? (y/n)");

        let second = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("Convert b.mp4? (y/n)".to_string()).await }
        });
        assert_eq!(next_question(&mut console).await, "[#2] Convert b.mp4? (y/n)");

        console.input.write_all(b"#2 no\n1 yes\n").await.unwrap();

        assert_eq!(first.await.unwrap(), Ok("yes".to_string()));
        assert_eq!(second.await.unwrap(), Ok("no".to_string()));
        assert_eq!(console.router.pending(), 0);
    }

    #[tokio::test]
    async fn test_bare_answer_goes_to_oldest() {
        let mut console = console();

        let first = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("first".to_string()).await }
        });
        next_question(&mut console).await;
        let second = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("second".to_string()).await }
        });
        next_question(&mut console).await;

        // Unknown ids are ignored, not delivered to anyone.
        console.input.write_all(b"99 y\ny\nn\n").await.unwrap();

        assert_eq!(first.await.unwrap(), Ok("y".to_string()));
        assert_eq!(second.await.unwrap(), Ok("n".to_string()));
    }

    #[tokio::test]
    async fn test_close_resolves_pending() {
        let mut console = console();

        let waiting = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("pending".to_string()).await }
        });
        next_question(&mut console).await;

        console.router.close();
        assert_eq!(waiting.await.unwrap(), Err(PromptError::Closed));
        assert_eq!(
            console.router.ask("late".to_string()).await,
            Err(PromptError::Closed)
        );
    }

    #[tokio::test]
    async fn test_end_of_input_closes() {
        let mut console = console();

        let waiting = tokio::spawn({
            let router = console.router.clone();
            async move { router.ask("pending".to_string()).await }
        });
        next_question(&mut console).await;

        drop(console.input);
        assert_eq!(waiting.await.unwrap(), Err(PromptError::Closed));
    }
}
