// Console interpreter.
//
// `Console` carries out the effects the router produces. Local text goes
// straight into the transcript. Remote calls become tasks whose results
// are rendered when the event loop calls `pump`. Navigation and session
// clearing end the console with a `Flow::Leave`. Nothing in here touches
// the terminal, so the whole interpreter runs under plain unit tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use tracing::{info, warn};

use crate::api::{Backend, RemoteError};
use crate::cookies::SessionCookies;
use crate::router::{Effect, Router};
use crate::task::TaskPool;
use crate::transcript::{RenderMode, Transcript};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The console is done; the operator continues at this URL.
    Leave(Url),
}

pub struct Console<B: Backend> {
    router: Router,
    transcript: Transcript,
    tasks: TaskPool<B>,
    cookies: Arc<SessionCookies>,
    base_url: Url,
    session_file: Option<PathBuf>,
}

impl<B: Backend> Console<B> {
    pub fn new(
        router: Router,
        mode: RenderMode,
        backend: Arc<B>,
        cookies: Arc<SessionCookies>,
        base_url: Url,
    ) -> Self {
        Console {
            router,
            transcript: Transcript::new(mode),
            tasks: TaskPool::new(backend),
            cookies,
            base_url,
            session_file: None,
        }
    }

    /// Cookies are written here again after `exit` clears them.
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending(&self) -> usize {
        self.tasks.in_flight()
    }

    /// Handles one submitted line.
    pub fn submit(&mut self, line: &str) -> Result<Flow> {
        let Some(effect) = self.router.handle_submit(line) else {
            return Ok(Flow::Continue);
        };
        let label = line.trim();

        match effect {
            Effect::LocalRender(text) => {
                self.transcript.render(label, &text);
                Ok(Flow::Continue)
            }
            Effect::RemoteCall(call) => {
                // a newer answer would overwrite an older one anyway
                if self.transcript.mode() == RenderMode::Replace {
                    self.tasks.cancel_all();
                }
                self.tasks.spawn(label, call);
                Ok(Flow::Continue)
            }
            Effect::Navigate(target) => self.leave(&target),
            Effect::ClearSession { redirect } => {
                let expired = self.cookies.expire_all();
                info!(count = expired.len(), "session cleared");
                self.persist_cookies();
                self.leave(&redirect)
            }
        }
    }

    fn leave(&mut self, target: &str) -> Result<Flow> {
        self.tasks.cancel_all();
        let url = self
            .base_url
            .join(target)
            .with_context(|| format!("Invalid navigation target {target:?}"))?;
        info!(%url, "leaving console");
        Ok(Flow::Leave(url))
    }

    /// Renders every remote result that has arrived. Returns true if the
    /// transcript changed.
    pub fn pump(&mut self) -> bool {
        let done = self.tasks.drain();
        let changed = !done.is_empty();
        for completion in done {
            self.render_outcome(&completion.label, completion.outcome);
        }
        changed
    }

    /// Waits for in-flight calls and renders them.
    pub fn settle(&mut self, timeout: Duration) -> usize {
        let done = self.tasks.wait_idle(timeout);
        let count = done.len();
        for completion in done {
            self.render_outcome(&completion.label, completion.outcome);
        }
        count
    }

    fn render_outcome(&mut self, label: &str, outcome: Result<String, RemoteError>) {
        match outcome {
            Ok(text) => self.transcript.render(label, &text),
            Err(e) => {
                if e == RemoteError::Unauthenticated {
                    // forget the dead session so the next start asks to log in
                    self.cookies.expire_all();
                    self.persist_cookies();
                }
                self.transcript.render_error(label, &e.to_string())
            }
        }
    }

    fn persist_cookies(&self) {
        if let Some(path) = &self.session_file {
            if let Err(e) = self.cookies.persist(path) {
                warn!(error = %e, "could not rewrite session file");
            }
        }
    }

    /// Cancels all in-flight calls, noting each one in the transcript.
    pub fn cancel_pending(&mut self) -> usize {
        let cancelled = self.tasks.cancel_all();
        for label in &cancelled {
            self.transcript
                .render_error(label, &RemoteError::Cancelled.to_string());
        }
        cancelled.len()
    }

    /// Records a failure that happened while handling `line`.
    pub fn report_error(&mut self, line: &str, err: &anyhow::Error) {
        warn!(line, error = %err, "command failed");
        self.transcript.render_error(line.trim(), &format!("{err:#}"));
    }
}
