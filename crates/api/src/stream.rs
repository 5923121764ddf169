//! Live run stream over WebSocket.
//!
//! [`RunStreamClient::connect`] opens `{ws_url}/workflows/runs/{runId}/stream`
//! and spawns a reader task that turns frames into [`StreamNotice`]s. The task
//! emits `Opened` once, then events in arrival order, and finishes with
//! `Closed` (preceded by `Error` when the transport failed). There is no
//! reconnection.

use futures_util::StreamExt;
use testbench_types::{StreamNotice, decode_stream_message};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
};
use tracing::{debug, warn};

use crate::segment;

/// Capacity of the notice channel between the reader task and its consumer.
pub const NOTICE_CHANNEL_CAPACITY: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Failure to establish the live stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid stream request for {url}: {reason}")]
    Request { url: String, reason: String },
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
}

/// Opens live subscriptions for workflow runs.
#[derive(Clone)]
pub struct RunStreamClient {
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for RunStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStreamClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RunStreamClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, token }
    }

    /// Builds a client from resolved configuration.
    pub fn from_config(config: &testbench_util::PlatformConfig) -> Self {
        Self::new(config.ws_url.clone(), config.api_token.clone())
    }

    /// URL of the stream for one run.
    pub fn stream_url(&self, run_id: &str) -> String {
        format!("{}/workflows/runs/{}/stream", self.base_url, segment(run_id))
    }

    /// Connects to the run's stream and starts forwarding notices.
    ///
    /// Messages tagged with a different `runId` are reported as
    /// [`StreamNotice::Unrecognized`].
    pub async fn connect(&self, run_id: &str) -> Result<RunSubscription, StreamError> {
        let url = self.stream_url(run_id);
        let mut request = url.as_str().into_client_request().map_err(|error| StreamError::Request {
            url: url.clone(),
            reason: error.to_string(),
        })?;

        if let Some(token) = self.token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| StreamError::Request {
                url: url.clone(),
                reason: "api token contains characters not allowed in a header".into(),
            })?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!(%url, "connecting run stream");
        let (socket, _response) = connect_async(request).await.map_err(|source| StreamError::Connect {
            url: url.clone(),
            source: Box::new(source),
        })?;

        let (notice_tx, receiver) = mpsc::channel(NOTICE_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(reader_loop(socket, notice_tx, close_rx, run_id.to_string()));

        Ok(RunSubscription {
            receiver,
            close_tx: Some(close_tx),
            task: Some(task),
        })
    }
}

/// Handle to an open live stream.
///
/// Dropping the subscription closes the underlying connection.
#[derive(Debug)]
pub struct RunSubscription {
    receiver: mpsc::Receiver<StreamNotice>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RunSubscription {
    /// Creates a subscription fed by the returned sender instead of a socket.
    ///
    /// Used by alternative transports and in tests; dropping the sender ends
    /// the subscription.
    pub fn channel(capacity: usize) -> (mpsc::Sender<StreamNotice>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscription = Self {
            receiver,
            close_tx: None,
            task: None,
        };
        (sender, subscription)
    }

    /// Waits for the next notice. `None` once the stream has been fully drained.
    pub async fn next(&mut self) -> Option<StreamNotice> {
        self.receiver.recv().await
    }

    /// Closes the connection. Notices already buffered stay readable.
    pub fn disconnect(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
        self.task.take();
        self.receiver.close();
    }
}

impl Drop for RunSubscription {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn reader_loop(mut socket: Socket, notice_tx: mpsc::Sender<StreamNotice>, close_rx: oneshot::Receiver<()>, run_id: String) {
    tokio::pin!(close_rx);

    if notice_tx.send(StreamNotice::Opened).await.is_err() {
        let _ = socket.close(None).await;
        return;
    }

    loop {
        let frame = tokio::select! {
            biased;

            _ = &mut close_rx => {
                debug!(%run_id, "run stream closed by client");
                let _ = socket.close(None).await;
                return;
            }

            frame = socket.next() => frame,
        };

        let notice = match frame {
            Some(Ok(Message::Text(text))) => Some(notice_for_text(text.as_str(), &run_id)),
            Some(Ok(Message::Binary(bytes))) => Some(StreamNotice::Unrecognized(format!("binary frame of {} bytes", bytes.len()))),
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => None,
            Some(Ok(Message::Close(frame))) => {
                debug!(%run_id, ?frame, "run stream closed by server");
                let _ = notice_tx.send(StreamNotice::Closed).await;
                return;
            }
            Some(Err(error)) => {
                warn!(%run_id, %error, "run stream transport error");
                let _ = notice_tx.send(StreamNotice::Error(error.to_string())).await;
                let _ = notice_tx.send(StreamNotice::Closed).await;
                return;
            }
            None => {
                let _ = notice_tx.send(StreamNotice::Closed).await;
                return;
            }
        };

        if let Some(notice) = notice
            && notice_tx.send(notice).await.is_err()
        {
            let _ = socket.close(None).await;
            return;
        }
    }
}

/// Classifies one text frame.
fn notice_for_text(text: &str, run_id: &str) -> StreamNotice {
    match decode_stream_message(text) {
        Ok(message) => match message.run_id {
            Some(other) if other != run_id => StreamNotice::Unrecognized(format!("message for run '{other}' on stream of '{run_id}'")),
            _ => StreamNotice::Event(message.event),
        },
        Err(error) => StreamNotice::Unrecognized(error.to_string()),
    }
}
