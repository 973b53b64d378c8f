//! Keeps the session from idling out.
//!
//! One task per session: sleep until `interval` after the last send, and
//! ping if nothing else went out in the meantime. The deadline is re-armed
//! from the monotonic clock on every wake-up, and the task ends as soon as
//! the session's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use skype_proto::Packet;
use tokio::sync::mpsc;

use crate::connection::Shared;
use crate::requests;
use crate::update::Event;

pub(crate) struct KeepAlive {
    pub(crate) shared:   Arc<Shared>,
    pub(crate) interval: Duration,
    /// Set when the active-endpoint keepalive is on.
    pub(crate) epid:     Option<String>,
    pub(crate) events:   mpsc::UnboundedSender<Event>,
}

impl KeepAlive {
    fn packets(&self) -> Vec<Packet> {
        let mut packets = vec![requests::ping()];
        if let Some(epid) = &self.epid {
            packets.push(requests::active_endpoint(epid));
        }
        packets
    }

    pub(crate) async fn run(self) {
        let packets = self.packets();
        let cancel = self.shared.cancel.clone();
        loop {
            let deadline = self.shared.last_send().await + self.interval;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {}
            }
            match self.shared.send_if_idle(self.interval, &packets).await {
                Ok(true) => tracing::trace!("[skype] keepalive sent"),
                Ok(false) => {}
                Err(e) => {
                    if !self.shared.disconnect_requested() {
                        tracing::warn!("[skype] keepalive failed: {e}");
                        let _ = self.events.send(Event::Error(e));
                    }
                    cancel.cancel();
                    break;
                }
            }
        }
        tracing::debug!("[skype] keepalive stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxedSocket;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    fn spawn(epid: Option<&str>) -> (Arc<Shared>, tokio::io::DuplexStream, mpsc::UnboundedReceiver<Event>) {
        let (client, server) = tokio::io::duplex(4096);
        let socket: BoxedSocket = Box::new(client);
        let (_reader, writer) = tokio::io::split(socket);
        let shared = Arc::new(Shared::new(writer));
        let (tx, rx) = mpsc::unbounded_channel();
        let task = KeepAlive {
            shared:   shared.clone(),
            interval: Duration::from_secs(30),
            epid:     epid.map(str::to_string),
            events:   tx,
        };
        tokio::spawn(task.run());
        (shared, server, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn pings_only_after_a_quiet_interval() {
        let (_shared, mut server, _events) = spawn(None);
        let mut buf = [0u8; 64];

        assert!(timeout(Duration::from_secs(29), server.read(&mut buf)).await.is_err());

        let n = timeout(Duration::from_secs(2), server.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"PNG 1 CON 2\r\n\r\n");

        assert!(timeout(Duration::from_secs(29), server.read(&mut buf)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn other_traffic_postpones_the_ping() {
        let (shared, mut server, _events) = spawn(None);
        let mut buf = [0u8; 512];

        tokio::time::sleep(Duration::from_secs(20)).await;
        shared.send(&requests::subscribe()).await.unwrap();
        let n = server.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"PUT 1 MSGR\\SUBSCRIPTIONS"));

        // 30 s after start, but only 10 s after the last send.
        assert!(timeout(Duration::from_secs(29), server.read(&mut buf)).await.is_err());
        let n = timeout(Duration::from_secs(2), server.read(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf[..n], b"PNG 2 CON 2\r\n\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn active_endpoint_follows_ping() {
        let (_shared, mut server, _events) = spawn(Some("e-1"));
        let mut wire = Vec::new();
        let expected = requests::active_endpoint("e-1").body.len();
        let total = 15 + format!("PUT 2 MSGR\\ACTIVEENDPOINT {}\r\n\r\n", expected + 2).len() + expected;
        while wire.len() < total {
            let mut buf = [0u8; 256];
            let n = server.read(&mut buf).await.unwrap();
            wire.extend_from_slice(&buf[..n]);
        }
        assert!(wire.starts_with(b"PNG 1 CON 2\r\n\r\nPUT 2 MSGR\\ACTIVEENDPOINT "));
        assert!(wire.ends_with(b"<activeendpoint><epid>{e-1}</epid></activeendpoint>"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_task() {
        let (shared, mut server, _events) = spawn(None);
        shared.cancel.cancel();
        let mut buf = [0u8; 64];
        assert!(timeout(Duration::from_secs(120), server.read(&mut buf)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_is_reported() {
        let (shared, server, mut events) = spawn(None);
        drop(server);
        let event = events.recv().await.unwrap();
        assert!(matches!(event, Event::Error(_)));
        assert!(shared.cancel.is_cancelled());
    }
}
