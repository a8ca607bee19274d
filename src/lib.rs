//! **snackdaemon**: show a status snackbar, keep it up to date, hide it
//! when it goes idle.
//!
//! A small daemon listens on a local socket.  `update <option>` opens the
//! snackbar (if needed), switches it to the option's index and (re)starts
//! an idle timer; when the timer runs out the snackbar is closed.  The
//! commands that actually open, update and close the widget come from a
//! JSON config and are opaque to the daemon.
//!
//! # Architecture
//!
//! * [`message`]: the length-prefixed wire frame and its stream helpers.
//! * [`timer`]: a single-slot, generation-checked auto-close scheduler.
//! * [`config`] / [`store`]: loading, validating and hot-swapping the
//!   configuration.
//! * [`daemon`]: the [`Dispatcher`](daemon::Dispatcher) state machine and
//!   its accept loop.
//! * [`ipc`]: endpoints, listener and the one-shot client.
//! * [`traits::ActionRunner`]: how commands get executed; [`shell`] holds
//!   the process-spawning implementation.

pub mod config;
pub mod daemon;
pub mod ipc;
pub mod message;
pub mod shell;
pub mod store;
pub mod timer;
pub mod traits;
