//! The daemon: owns the snackbar state and reacts to requests.
//!
//! [`Dispatcher`] holds everything the daemon knows: the active
//! configuration (via [`ConfigStore`]), the auto-close [`Handle`] and the
//! `serving` flag.  [`Dispatcher::handle`] is a pure state transition from a
//! request to an optional reply; [`Dispatcher::serve`] wraps it in the
//! accept loop.
//!
//! The snackbar is considered open exactly while an auto-close handle is
//! pending.  The deferred close owns an `Arc<Config>` snapshot taken when it
//! was armed, so a later reload never changes what it will run.

use crate::config::{Config, ConfigError};
use crate::ipc::client::Client;
use crate::ipc::listener::{Endpoint, Incoming, Listener, Stream};
use crate::message::{read_message, write_message, Message, MessageType};
use crate::store::ConfigStore;
use crate::timer::{Handle, Scheduler};
use crate::traits::{Action, ActionRunner};
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Reply to an `UPDATE` naming an option that is not configured.
pub const NO_SUCH_OPTION: &str = "no such option";

/// Reply to a `RELOAD` whose configuration could not be loaded.
pub const FAILED_TO_RELOAD: &str = "failed to reload";

/// Read/write timeout applied to every accepted connection.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(150);

const TAKEOVER_ATTEMPTS: u32 = 5;
const TAKEOVER_DELAY: Duration = Duration::from_millis(500);

/// Fatal daemon start-up errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
    #[error("unable to close the old daemon on {0}")]
    Takeover(Endpoint),
    #[error("cannot listen on {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        source: io::Error,
    },
}

/// Request handler and owner of all daemon state.
pub struct Dispatcher<R: ActionRunner> {
    runner: Arc<R>,
    store: ConfigStore,
    scheduler: Scheduler,
    auto_close: Option<Handle>,
    serving: bool,
}

impl<R: ActionRunner> Dispatcher<R> {
    /// A serving dispatcher with the snackbar closed and no timer armed.
    pub fn new(runner: R, store: ConfigStore) -> Self {
        Self {
            runner: Arc::new(runner),
            store,
            scheduler: Scheduler::new(),
            auto_close: None,
            serving: true,
        }
    }

    pub fn is_serving(&self) -> bool {
        self.serving
    }

    /// `true` while an auto-close is pending, i.e. the snackbar is shown.
    pub fn is_open(&self) -> bool {
        self.auto_close
            .as_ref()
            .is_some_and(|h| self.scheduler.is_pending(h))
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<Config> {
        self.store.current()
    }

    pub fn config_path(&self) -> &Path {
        self.store.path()
    }

    /// Process one request.
    ///
    /// Returns the reply to send, or `None` for messages a daemon never
    /// expects to receive (`ERROR`, `RESPOND`, unknown types).
    pub fn handle(&mut self, message: &Message) -> Option<Message> {
        let reply = match message.kind {
            MessageType::Ping => {
                info!("ping");
                Message::respond("pong")
            }
            MessageType::Kill => {
                info!("kill");
                self.serving = false;
                Message::respond("ok")
            }
            MessageType::Close => self.close(),
            MessageType::Update => self.update(&message.value),
            MessageType::Reload => self.reload(&message.value),
            MessageType::Error | MessageType::Respond | MessageType::Unknown(_) => {
                warn!("unexpected message: {}", message);
                return None;
            }
        };
        Some(reply)
    }

    fn close(&mut self) -> Message {
        info!("close");
        if let Some(handle) = self.auto_close.take() {
            if self.scheduler.cancel(&handle) {
                let config = self.store.current();
                run_action(self.runner.as_ref(), &close_action(&config));
            }
        }
        Message::respond("")
    }

    fn update(&mut self, option: &str) -> Message {
        let config = self.store.current();
        let Some(index) = config.option_index(option) else {
            info!("update: {} (no such option)", option);
            return Message::respond(NO_SUCH_OPTION);
        };

        // Cancel first so the timer cannot fire between the "is it open?"
        // check and the re-arm below.
        let was_open = self
            .auto_close
            .take()
            .is_some_and(|h| self.scheduler.cancel(&h));
        if !was_open {
            run_action(
                self.runner.as_ref(),
                &Action::new(config.open_command.clone(), config.shell.clone()),
            );
        }
        run_action(
            self.runner.as_ref(),
            &Action::new(config.update_command_for(index), config.shell.clone()),
        );
        info!("update: {} (index: {})", option, index);

        let runner = Arc::clone(&self.runner);
        let snapshot = Arc::clone(&config);
        self.auto_close = Some(self.scheduler.arm(config.idle_timeout, move || {
            info!("idle timeout reached, closing");
            run_action(runner.as_ref(), &close_action(&snapshot));
        }));
        Message::respond("")
    }

    fn reload(&mut self, value: &str) -> Message {
        let candidate = (!value.is_empty()).then(|| Path::new(value));
        match self.store.reload(candidate) {
            Ok(config) => {
                info!(
                    "reload: reloaded with {:?}\n{}",
                    self.store.path().display(),
                    config
                );
                Message::respond("ok")
            }
            Err(e) => {
                warn!("reload: failed to reload: {}", e);
                Message::respond(FAILED_TO_RELOAD)
            }
        }
    }

    /// Accept and answer connections until a `KILL` arrives.
    ///
    /// Each connection carries exactly one request.  A connection that does
    /// not deliver a valid frame is dropped and the loop carries on.  The
    /// listener is dropped on return, which takes the endpoint down.
    pub fn serve(&mut self, listener: Listener) {
        info!("serving on {}", listener.endpoint());
        self.serve_incoming(&listener);
        info!("stopped serving on {}", listener.endpoint());
    }

    /// The accept loop behind [`serve`](Self::serve).
    ///
    /// A failed `accept` is retried after [`ACCEPT_BACKOFF`]; a run of
    /// failures with the same error kind is logged once.
    fn serve_incoming<L: Incoming>(&mut self, incoming: &L) {
        let mut last_error = None::<io::ErrorKind>;
        while self.serving {
            match incoming.accept() {
                Ok(stream) => {
                    last_error = None;
                    self.serve_one(stream);
                }
                Err(e) => {
                    if last_error != Some(e.kind()) {
                        error!("accept error: {}", e);
                    }
                    last_error = Some(e.kind());
                    std::thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
        self.shutdown();
    }

    fn serve_one(&mut self, mut stream: Stream) {
        if let Err(e) = stream.set_timeout(Some(CLIENT_TIMEOUT)) {
            warn!("failed to set client timeout: {}", e);
        }
        let request = match read_message(&mut stream) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping connection: {}", e);
                return;
            }
        };
        if let Some(reply) = self.handle(&request) {
            if let Err(e) = write_message(&mut stream, &reply) {
                warn!("failed to send reply: {}", e);
            }
        }
        debug!("client disconnected");
    }

    /// Disarm any pending auto-close without running it.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.auto_close.take() {
            if self.scheduler.cancel(&handle) {
                debug!("dropped pending auto-close on shutdown");
            }
        }
    }
}

fn close_action(config: &Config) -> Action {
    Action::new(config.close_command.clone(), config.shell.clone())
}

/// Run `action`, logging (and otherwise ignoring) a failure.
fn run_action<R: ActionRunner>(runner: &R, action: &Action) {
    debug!("running `{}`", action);
    if let Err(e) = runner.run(action) {
        error!("action `{}` failed: {}", action, e);
    }
}

//  Start-up

/// Make `endpoint` free for a new daemon.
///
/// A daemon already listening there is sent `KILL` (up to five times, half
/// a second apart) until it stops answering.  A leftover socket file with
/// nobody behind it is removed.
pub fn stop_previous_instance(endpoint: &Endpoint) -> Result<(), DaemonError> {
    let client = Client::new(endpoint.clone()).with_timeout(Some(CLIENT_TIMEOUT));
    for attempt in 0..TAKEOVER_ATTEMPTS {
        match client.kill() {
            Ok(reply) => info!("try[{}]: previous daemon replied {:?}", attempt, reply),
            Err(e) if e.is_connect() => {
                remove_stale_socket(endpoint);
                return Ok(());
            }
            Err(e) => warn!("try[{}]: {}", attempt, e),
        }
        std::thread::sleep(TAKEOVER_DELAY);
    }
    Err(DaemonError::Takeover(endpoint.clone()))
}

fn remove_stale_socket(endpoint: &Endpoint) {
    use std::os::unix::fs::FileTypeExt;

    let Some(path) = endpoint.path() else {
        return;
    };
    let is_socket = std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_socket());
    if is_socket {
        match std::fs::remove_file(path) {
            Ok(()) => info!("removed stale socket {}", path.display()),
            Err(e) => warn!("failed to remove stale socket {}: {}", path.display(), e),
        }
    }
}

/// Load the configuration and take over `endpoint`.
///
/// On success the endpoint is bound and the returned dispatcher is ready
/// to [`serve`](Dispatcher::serve) the listener.
pub fn start<R: ActionRunner>(
    runner: R,
    config_path: PathBuf,
    endpoint: &Endpoint,
) -> Result<(Dispatcher<R>, Listener), DaemonError> {
    let store = ConfigStore::load(config_path)?;
    info!(
        "loaded config from {}\n{}",
        store.path().display(),
        store.current()
    );

    stop_previous_instance(endpoint)?;
    let listener = Listener::bind(endpoint).map_err(|e| DaemonError::Bind {
        endpoint: endpoint.clone(),
        source: e,
    })?;

    Ok((Dispatcher::new(runner, store), listener))
}

/// [`start`], then serve until killed.
pub fn run<R: ActionRunner>(
    runner: R,
    config_path: PathBuf,
    endpoint: &Endpoint,
) -> Result<(), DaemonError> {
    let (mut dispatcher, listener) = start(runner, config_path, endpoint)?;
    dispatcher.serve(listener);
    Ok(())
}

//  Tests
