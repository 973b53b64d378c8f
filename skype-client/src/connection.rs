//! The live session: one shared send path and the receive task.
//!
//! All writes go through [`Shared::send`], which holds a single lock over
//! the socket's write half, the sequence counter and the registration
//! token, so packets from callers, the keepalive task and the receive task
//! never interleave. The receive task owns the read half and the
//! [`StateMachine`], and is the only place a redirect swaps the socket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use skype_proto::{Frame, Packet, Session};
use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::Credentials;
use crate::codec;
use crate::errors::ClientError;
use crate::handshake::Authenticator;
use crate::state::{Action, StateMachine};
use crate::transport::{BoxedSocket, Connector, Purpose};
use crate::update::Event;

// ─── Shared send path ─────────────────────────────────────────────────────────

struct Outbound {
    writer:    Option<WriteHalf<BoxedSocket>>,
    session:   Session,
    last_send: Instant,
}

pub(crate) struct Shared {
    outbound:             Mutex<Outbound>,
    disconnect_requested: AtomicBool,
    pub(crate) cancel:    CancellationToken,
}

impl Shared {
    pub(crate) fn new(writer: WriteHalf<BoxedSocket>) -> Self {
        Self {
            outbound: Mutex::new(Outbound {
                writer:    Some(writer),
                session:   Session::new(),
                last_send: Instant::now(),
            }),
            disconnect_requested: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Frame and write one packet.
    pub(crate) async fn send(&self, packet: &Packet) -> Result<(), ClientError> {
        let mut out = self.outbound.lock().await;
        write_locked(&mut out, packet).await
    }

    /// Send `packets` if nothing was sent for `interval`. Returns whether
    /// they were sent.
    pub(crate) async fn send_if_idle(&self, interval: Duration, packets: &[Packet]) -> Result<bool, ClientError> {
        let mut out = self.outbound.lock().await;
        if Instant::now() < out.last_send + interval {
            return Ok(false);
        }
        for packet in packets {
            write_locked(&mut out, packet).await?;
        }
        Ok(true)
    }

    /// Run an inbound frame through the session (benign statuses, server
    /// errors, `Set-Registration`).
    pub(crate) async fn accept(&self, frame: Frame) -> Result<Option<Packet>, ClientError> {
        Ok(self.outbound.lock().await.session.accept(frame)?)
    }

    pub(crate) async fn last_send(&self) -> Instant {
        self.outbound.lock().await.last_send
    }

    /// Swap in the write half of a new socket; the counter starts over, the
    /// registration token is kept.
    pub(crate) async fn replace_writer(&self, writer: WriteHalf<BoxedSocket>) {
        let mut out = self.outbound.lock().await;
        if let Some(mut old) = out.writer.replace(writer) {
            let _ = old.shutdown().await;
        }
        out.session.reset();
    }

    /// Drop the socket. Later sends fail with [`ClientError::NotConnected`].
    pub(crate) async fn close(&self) {
        if let Some(mut writer) = self.outbound.lock().await.writer.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Mark the disconnect as requested. Returns `false` if it already was.
    pub(crate) fn request_disconnect(&self) -> bool {
        !self.disconnect_requested.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn disconnect_requested(&self) -> bool {
        self.disconnect_requested.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn seq(&self) -> u32 {
        self.outbound.lock().await.session.seq()
    }
}

async fn write_locked(out: &mut Outbound, packet: &Packet) -> Result<(), ClientError> {
    let Outbound { writer, session, last_send } = out;
    let writer = writer.as_mut().ok_or(ClientError::NotConnected)?;
    let wire = session.encode(&packet.command, &packet.params, &packet.body);
    writer.write_all(&wire).await?;
    writer.flush().await?;
    *last_send = Instant::now();
    tracing::trace!("[skype] -> {} {} seq={}", packet.command, packet.params, session.seq());
    Ok(())
}

// ─── Receive task ─────────────────────────────────────────────────────────────

pub(crate) struct Receiver {
    pub(crate) shared:          Arc<Shared>,
    pub(crate) reader:          BufReader<ReadHalf<BoxedSocket>>,
    pub(crate) machine:         StateMachine,
    pub(crate) connector:       Arc<dyn Connector>,
    pub(crate) authenticator:   Arc<dyn Authenticator>,
    pub(crate) credentials:     Credentials,
    pub(crate) connect_timeout: Duration,
    pub(crate) events:          mpsc::UnboundedSender<Event>,
    pub(crate) ready:           Option<oneshot::Sender<Result<(), ClientError>>>,
}

impl Receiver {
    /// Drive the session until it ends, then tear it down.
    pub(crate) async fn run(mut self) {
        if let Err(e) = self.pump().await {
            self.fail(e);
        }
        if self.shared.disconnect_requested() {
            self.machine.disconnect();
        }
        tracing::debug!("[skype] session ended in {:?}", self.machine.state());
        self.machine.closed();
        self.shared.cancel.cancel();
        self.shared.close().await;
        tracing::debug!("[skype] receive task finished");
    }

    async fn pump(&mut self) -> Result<(), ClientError> {
        let start = self.machine.begin();
        self.apply(start).await?;

        let cancel = self.shared.cancel.clone();
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                frame = codec::read_frame(&mut self.reader) => frame?,
            };
            let Some(frame) = frame else {
                return Err(ClientError::eof());
            };
            let Some(packet) = self.shared.accept(frame).await? else {
                continue;
            };
            let actions = self.machine.handle(&packet)?;
            self.apply(actions).await?;
        }
    }

    async fn apply(&mut self, actions: Vec<Action>) -> Result<(), ClientError> {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send(packet) => self.shared.send(&packet).await?,
                Action::AcquireToken { nonce } => {
                    let uic = self
                        .authenticator
                        .uic_token(self.credentials.username(), self.credentials.secret(), &nonce)
                        .await?;
                    tracing::debug!("[skype] UIC token acquired ({} bytes)", uic.len());
                    for next in self.machine.token_acquired(&uic).into_iter().rev() {
                        queue.push_front(next);
                    }
                }
                Action::Redirect { host, port } => {
                    self.redirect(&host, port).await?;
                    for next in self.machine.begin().into_iter().rev() {
                        queue.push_front(next);
                    }
                }
                Action::Connected => {
                    if let Some(ready) = self.ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                }
                Action::Emit(event) => {
                    let _ = self.events.send(event);
                }
            }
        }
        Ok(())
    }

    async fn redirect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        let socket = tokio::time::timeout(
            self.connect_timeout,
            self.connector.connect(host, port, Purpose::Session),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        let (reader, writer) = tokio::io::split(socket);
        self.shared.replace_writer(writer).await;
        self.reader = BufReader::new(reader);
        Ok(())
    }

    /// Route a fatal error: to `connect` if it is still waiting, otherwise
    /// onto the event stream. Swallowed once disconnect was requested.
    fn fail(&mut self, e: ClientError) {
        if self.shared.disconnect_requested() {
            tracing::debug!("[skype] error after disconnect ignored: {e}");
            return;
        }
        match self.ready.take() {
            Some(ready) => {
                let _ = ready.send(Err(e));
            }
            None => {
                tracing::error!("[skype] session failed: {e}");
                let _ = self.events.send(Event::Error(e));
            }
        }
    }
}
