//! Socket driver and dispatch worker.
//!
//! [`WsClient`] is a cheap handle. The driver task it spawns owns the socket,
//! the heartbeat interval and the retry timer, waits on all of them in one
//! `select!`, and feeds what happened through the [`ConnectionMachine`].
//! Decodable payloads go over a channel to a second task that handles them
//! strictly in order.

use super::backoff::Backoff;
use super::machine::{Command, ConnEvent, ConnectionMachine, ConnectionState, Frame};
use super::EnvelopeHandler;
use crate::api::HydraApi;
use crate::config::CompanionConfig;
use crate::envelope::{self, Envelope};
use crate::launcher::LauncherProbe;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT: &str = "PING";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WsSettings {
    /// Endpoint without the token; `?token=` is added per attempt.
    pub url: Url,
    pub heartbeat_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl WsSettings {
    pub fn from_config(config: &CompanionConfig) -> Result<Self> {
        let url = Url::parse(&config.ws_url)
            .with_context(|| format!("Invalid ws_url: {}", config.ws_url))?;
        Ok(Self {
            url,
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
        })
    }
}

/// Adds the socket token to the endpoint as a url-encoded query parameter.
pub fn socket_url(base: &Url, token: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("token", token);
    url
}

enum Request {
    Connect,
    Shutdown,
}

pub struct WsClient {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicUsize>,
    driver: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl WsClient {
    /// Starts the driver and dispatch tasks. Nothing connects until [`connect`](Self::connect).
    pub fn spawn(
        settings: WsSettings,
        api: Arc<dyn HydraApi>,
        probe: Arc<dyn LauncherProbe>,
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let attempts = Arc::new(AtomicUsize::new(0));

        let driver = Driver {
            machine: ConnectionMachine::new(Backoff::new(
                settings.reconnect_base,
                settings.reconnect_max,
            )),
            settings,
            api,
            requests: requests_rx,
            frames: frames_tx,
            state: state_tx,
            attempts: Arc::clone(&attempts),
            socket: None,
            pending_open: None,
            heartbeat: None,
            retry: None,
        };

        Self {
            requests: requests_tx,
            state: state_rx,
            attempts,
            driver: tokio::spawn(driver.run()),
            dispatcher: tokio::spawn(dispatch_frames(frames_rx, probe, handler)),
        }
    }

    /// Starts (or restarts after a shutdown) the connect cycle.
    pub fn connect(&self) {
        let _ = self.requests.send(Request::Connect);
    }

    /// Closes the socket and stops reconnecting. Handler calls already
    /// running are left to finish.
    pub fn shutdown(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[cfg(test)]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Connection attempts made so far, including failed token fetches.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Shuts down and waits for the driver to exit, then gives queued frames
    /// a bounded time to drain.
    pub async fn stop(self) {
        self.shutdown();
        let Self {
            requests,
            driver,
            mut dispatcher,
            ..
        } = self;
        drop(requests);

        if let Err(e) = driver.await {
            tracing::warn!(error = %e, "socket driver task failed");
        }
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut dispatcher).await.is_err() {
            tracing::debug!("dispatch worker still busy, aborting");
            dispatcher.abort();
        }
    }
}

struct Driver {
    machine: ConnectionMachine,
    settings: WsSettings,
    api: Arc<dyn HydraApi>,
    requests: mpsc::UnboundedReceiver<Request>,
    frames: mpsc::UnboundedSender<Vec<u8>>,
    state: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicUsize>,
    socket: Option<Socket>,
    pending_open: Option<JoinHandle<Result<Socket>>>,
    heartbeat: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
}

enum Input {
    Request(Option<Request>),
    OpenFinished(Result<Box<Socket>>),
    Inbound(Option<Result<Message, tungstenite::Error>>),
    Heartbeat,
    RetryElapsed,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                request = self.requests.recv() => Input::Request(request),
                result = wait_open(&mut self.pending_open) => Input::OpenFinished(result.map(Box::new)),
                message = next_message(&mut self.socket) => Input::Inbound(message),
                _ = wait_tick(&mut self.heartbeat) => Input::Heartbeat,
                _ = wait_retry(&mut self.retry) => Input::RetryElapsed,
            };

            let event = match input {
                Input::Request(Some(Request::Connect)) => Some(ConnEvent::ConnectRequested),
                Input::Request(Some(Request::Shutdown)) => Some(ConnEvent::ShutdownRequested),
                Input::Request(None) => {
                    self.apply(ConnEvent::ShutdownRequested).await;
                    break;
                }
                Input::OpenFinished(Ok(socket)) => {
                    tracing::info!("socket connected");
                    self.socket = Some(*socket);
                    Some(ConnEvent::Opened)
                }
                Input::OpenFinished(Err(e)) => {
                    tracing::warn!(error = %format!("{:#}", e), "socket connect failed");
                    Some(ConnEvent::ConnectFailed(e.to_string()))
                }
                Input::Inbound(Some(Ok(message))) => inbound_event(message),
                Input::Inbound(Some(Err(e))) => {
                    tracing::warn!(error = %e, "socket error");
                    Some(ConnEvent::Closed(e.to_string()))
                }
                Input::Inbound(None) => Some(ConnEvent::Closed("stream ended".to_string())),
                Input::Heartbeat => self.send_heartbeat().await,
                Input::RetryElapsed => Some(ConnEvent::RetryElapsed),
            };

            if let Some(event) = event {
                let opened = event == ConnEvent::Opened;
                self.apply(event).await;
                if opened && self.machine.state() != ConnectionState::Open {
                    self.socket = None;
                }
            }
        }
        tracing::debug!("socket driver exiting");
    }

    /// Runs one event through the machine, plus any events its commands produce.
    async fn apply(&mut self, event: ConnEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for command in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(command).await {
                    queue.push_back(follow_up);
                }
            }
            let state = self.machine.state();
            self.state.send_if_modified(|current| {
                if *current == state {
                    return false;
                }
                tracing::debug!(from = ?*current, to = ?state, "connection state changed");
                *current = state;
                true
            });
        }
    }

    async fn execute(&mut self, command: Command) -> Option<ConnEvent> {
        match command {
            Command::OpenSocket => {
                let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(attempt, "opening socket");
                let api = Arc::clone(&self.api);
                let url = self.settings.url.clone();
                self.pending_open = Some(tokio::spawn(open_socket(api, url)));
                None
            }
            Command::StartHeartbeat => {
                let period = self.settings.heartbeat_interval;
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.heartbeat = Some(interval);
                None
            }
            Command::StopHeartbeat => {
                self.heartbeat = None;
                None
            }
            Command::CloseSocket => {
                if let Some(pending) = self.pending_open.take() {
                    pending.abort();
                }
                if let Some(mut socket) = self.socket.take() {
                    if tokio::time::timeout(CLOSE_TIMEOUT, socket.close(None))
                        .await
                        .is_err()
                    {
                        tracing::debug!("close handshake timed out");
                    }
                }
                Some(ConnEvent::Closed("shutdown".to_string()))
            }
            Command::DropSocket => {
                self.socket = None;
                if let Some(pending) = self.pending_open.take() {
                    pending.abort();
                }
                None
            }
            Command::ScheduleReconnect(delay) => {
                tracing::info!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
                None
            }
            Command::CancelReconnect => {
                self.retry = None;
                None
            }
            Command::HandleFrame(bytes) => {
                if self.frames.send(bytes).is_err() {
                    tracing::warn!("dispatch worker gone, dropping frame");
                }
                None
            }
        }
    }

    async fn send_heartbeat(&mut self) -> Option<ConnEvent> {
        let socket = self.socket.as_mut()?;
        match socket.send(Message::text(HEARTBEAT)).await {
            Ok(()) => {
                tracing::trace!("heartbeat sent");
                None
            }
            Err(e) => Some(ConnEvent::Closed(format!("heartbeat failed: {}", e))),
        }
    }
}

fn inbound_event(message: Message) -> Option<ConnEvent> {
    match message {
        Message::Text(text) => Some(ConnEvent::FrameReceived(Frame::Text(
            text.as_str().to_string(),
        ))),
        Message::Binary(bytes) => Some(ConnEvent::FrameReceived(Frame::Binary(bytes.to_vec()))),
        Message::Close(frame) => {
            tracing::info!(frame = ?frame, "socket closed by server");
            Some(ConnEvent::Closed("closed by server".to_string()))
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}

async fn open_socket(api: Arc<dyn HydraApi>, base: Url) -> Result<Socket> {
    let token = api
        .ws_token()
        .await
        .context("Failed to fetch socket token")?;
    let url = socket_url(&base, &token);
    let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to open socket to {}", base))?;
    Ok(socket)
}

async fn wait_open(pending: &mut Option<JoinHandle<Result<Socket>>>) -> Result<Socket> {
    let Some(handle) = pending.as_mut() else {
        return std::future::pending().await;
    };
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("connect task failed: {}", e)),
    };
    *pending = None;
    result
}

async fn next_message(socket: &mut Option<Socket>) -> Option<Result<Message, tungstenite::Error>> {
    match socket.as_mut() {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn wait_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry.as_mut() {
        Some(sleep) => {
            sleep.as_mut().await;
            *retry = None;
        }
        None => std::future::pending().await,
    }
}

/// Decodes and routes frames one at a time.
async fn dispatch_frames(
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    probe: Arc<dyn LauncherProbe>,
    handler: Arc<dyn EnvelopeHandler>,
) {
    while let Some(bytes) = frames.recv().await {
        let envelope = match envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, len = bytes.len(), "dropping undecodable frame");
                continue;
            }
        };
        if matches!(envelope, Envelope::Unknown) {
            tracing::debug!("ignoring envelope without a known payload");
            continue;
        }
        if probe.is_running().await {
            tracing::debug!(kind = envelope.kind(), "launcher active, suppressing event");
            continue;
        }
        handler.handle(envelope).await;
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
