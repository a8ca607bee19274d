//! Local transport between the CLI and the daemon.
//!
//! [`listener`] owns addressing and the byte streams (Unix socket, Linux
//! abstract socket, or loopback TCP); [`client`] is the one-shot request
//! stub used by the CLI and by a starting daemon to stop its predecessor.

pub mod client;
pub mod listener;
