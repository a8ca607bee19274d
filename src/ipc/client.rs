//! One-shot request client.
//!
//! Every request opens a fresh connection, writes one frame, reads one frame
//! back and closes the connection.  Nothing is retried here; callers decide
//! what a failed connection means.

use crate::ipc::listener::{Endpoint, Stream};
use crate::message::{read_message, write_message, FrameError, Message};
use log::debug;
use std::io;
use std::time::Duration;

/// How long a request may wait on the daemon before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors reported by [`Client`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unable to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        source: io::Error,
    },
    #[error("bad exchange with daemon: {0}")]
    Frame(#[from] FrameError),
}

impl ClientError {
    /// `true` if nothing was listening (as opposed to a broken exchange).
    pub fn is_connect(&self) -> bool {
        matches!(self, ClientError::Connect { .. })
    }
}

/// Sends requests to a daemon at a fixed [`Endpoint`].
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Endpoint,
    timeout: Option<Duration>,
}

impl Client {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Override the per-request read/write timeout (`None` waits forever).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send `message` and wait for the single reply.
    pub fn request(&self, message: &Message) -> Result<Message, ClientError> {
        let mut stream = Stream::connect(&self.endpoint).map_err(|e| ClientError::Connect {
            endpoint: self.endpoint.clone(),
            source: e,
        })?;
        stream.set_timeout(self.timeout).map_err(FrameError::Io)?;

        debug!("sending {} to {}", message, self.endpoint);
        write_message(&mut stream, message)?;
        let reply = read_message(&mut stream)?;
        Ok(reply)
    }

    pub fn ping(&self) -> Result<String, ClientError> {
        self.request(&Message::ping()).map(|m| m.value)
    }

    pub fn kill(&self) -> Result<String, ClientError> {
        self.request(&Message::kill()).map(|m| m.value)
    }

    pub fn close(&self) -> Result<String, ClientError> {
        self.request(&Message::close()).map(|m| m.value)
    }

    pub fn update(&self, option: &str) -> Result<String, ClientError> {
        self.request(&Message::update(option)).map(|m| m.value)
    }

    /// Ask the daemon to reload, from `path` or from its current file.
    pub fn reload(&self, path: Option<&str>) -> Result<String, ClientError> {
        self.request(&Message::reload(path.unwrap_or(""))).map(|m| m.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::listener::tests::tmp_socket_path;
    use crate::ipc::listener::Listener;
    use crate::message::MessageType;

    /// Serve exactly one request with `reply`, returning what was received.
    fn one_shot_server(reply: Message) -> (Endpoint, std::thread::JoinHandle<Message>) {
        let endpoint = Endpoint::Path(tmp_socket_path());
        let listener = Listener::bind(&endpoint).unwrap();
        let handle = std::thread::spawn(move || {
            let mut stream = listener.accept().unwrap();
            let received = read_message(&mut stream).unwrap();
            write_message(&mut stream, &reply).unwrap();
            received
        });
        (endpoint, handle)
    }

    #[test]
    fn request_round_trip() {
        let (endpoint, server) = one_shot_server(Message::respond("pong"));
        let reply = Client::new(endpoint).request(&Message::ping()).unwrap();
        assert_eq!(reply, Message::respond("pong"));
        assert_eq!(server.join().unwrap().kind, MessageType::Ping);
    }

    #[test]
    fn helpers_send_expected_messages() {
        let (endpoint, server) = one_shot_server(Message::respond(""));
        assert_eq!(Client::new(endpoint).update("volume").unwrap(), "");
        assert_eq!(server.join().unwrap(), Message::update("volume"));

        let (endpoint, server) = one_shot_server(Message::respond("ok"));
        assert_eq!(Client::new(endpoint).reload(None).unwrap(), "ok");
        assert_eq!(server.join().unwrap(), Message::reload(""));
    }

    #[test]
    fn connect_failure_is_reported() {
        let client = Client::new(Endpoint::Path(tmp_socket_path()));
        let err = client.ping().unwrap_err();
        assert!(err.is_connect());
    }

    #[test]
    fn hang_up_without_reply_is_frame_error() {
        let endpoint = Endpoint::Path(tmp_socket_path());
        let listener = Listener::bind(&endpoint).unwrap();
        let server = std::thread::spawn(move || {
            let mut stream = listener.accept().unwrap();
            let _ = read_message(&mut stream);
            // Dropping the stream closes the connection unanswered.
        });
        let err = Client::new(endpoint).ping().unwrap_err();
        assert!(matches!(err, ClientError::Frame(FrameError::Io(_))));
        server.join().unwrap();
    }
}
