//! Subscription manager: keeps one tracked address subscribed to the
//! streaming endpoint for as long as the reconnect budget allows.
//!
//! State machine:
//! `Disconnected -> Connecting -> Subscribing -> Active -> (Closing | Failed) -> Disconnected`
//!
//! A session that ends for any reason is retried after a fixed delay. The
//! attempt counter resets once a session reaches `Active`; after
//! `max_reconnect_attempts` consecutive retries the manager stops for good.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, sleep, timeout};

use crate::config::{Commitment, SubscriptionSettings};
use crate::transport::{Link, Outbound, ReadyState, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribing,
    Active,
    Closing,
    Failed,
    /// Reconnect budget exhausted; needs an external restart.
    Stopped,
}

/// Receives the signature of every notification, each on its own task.
#[async_trait]
pub trait SignatureHandler: Send + Sync + 'static {
    async fn handle(&self, signature: String);
}

pub fn subscribe_request(address: &str, commitment: Commitment) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "logsSubscribe",
        "params": [
            {"mentions": [address]},
            {"commitment": commitment.as_str()}
        ]
    })
}

/// Extracts `params.result.value.signature`; any other shape is ignored.
pub fn parse_notification(text: &str) -> Option<String> {
    let v: Value = serde_json::from_str(text).ok()?;
    v.pointer("/params/result/value/signature")
        .and_then(|s| s.as_str())
        .map(|s| s.to_string())
}

pub struct SubscriptionManager<T: Transport> {
    ws_url: String,
    address: String,
    settings: SubscriptionSettings,
    transport: T,
    handler: Arc<dyn SignatureHandler>,
    reconnect_attempts: u32,
    state: watch::Sender<SessionState>,
}

impl<T: Transport> SubscriptionManager<T> {
    pub fn new(
        ws_url: String,
        address: String,
        settings: SubscriptionSettings,
        transport: T,
        handler: Arc<dyn SignatureHandler>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            ws_url,
            address,
            settings,
            transport,
            handler,
            reconnect_attempts: 0,
            state,
        }
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!("[{}] {:?} -> {:?}", self.address, prev, next);
        }
    }

    /// Runs until the reconnect budget is exhausted, which is the only
    /// error it returns.
    pub async fn run(mut self) -> Result<()> {
        loop {
            match self.session().await {
                Ok(()) => {
                    info!("[{}] Disconnected from RPC", self.address);
                    self.set_state(SessionState::Closing);
                }
                Err(e) => {
                    warn!("[{}] session failed: {e:?}", self.address);
                    self.set_state(SessionState::Failed);
                }
            }
            self.set_state(SessionState::Disconnected);

            if self.reconnect_attempts >= self.settings.max_reconnect_attempts {
                error!(
                    "[{}] Max reconnection attempts reached. Please check your connection and restart the application.",
                    self.address
                );
                self.set_state(SessionState::Stopped);
                return Err(anyhow!(
                    "subscription for {} stopped after {} reconnect attempts",
                    self.address,
                    self.reconnect_attempts
                ));
            }

            self.reconnect_attempts += 1;
            info!(
                "[{}] Attempting to reconnect ({}/{})...",
                self.address, self.reconnect_attempts, self.settings.max_reconnect_attempts
            );
            sleep(self.settings.reconnect_delay).await;
        }
    }

    /// One connection from open to close. `Ok` means the transport closed,
    /// `Err` means it never became usable.
    async fn session(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);
        let mut link = self.transport.open(&self.ws_url).await?;

        self.wait_until_open(&mut link.state).await?;

        self.set_state(SessionState::Subscribing);
        let request = subscribe_request(&self.address, self.settings.commitment);
        link.outbound
            .send(Outbound::Text(request.to_string()))
            .map_err(|_| anyhow!("Failed to send subscription request: transport gone"))?;
        info!("Subscription request sent for: {}", self.address);

        self.set_state(SessionState::Active);
        self.reconnect_attempts = 0;

        let heartbeat = tokio::spawn(heartbeat(
            self.address.clone(),
            link.outbound.clone(),
            link.state.clone(),
            self.settings.ping_interval,
        ));

        self.pump(&mut link).await;

        // dispatched pipelines keep running; only the heartbeat goes
        heartbeat.abort();
        Ok(())
    }

    /// Resolves once: when the transport leaves `Connecting`, or when the
    /// attempt budget runs out. The budget starts after `open` returns, so
    /// handshake time is not charged to it.
    async fn wait_until_open(&self, state: &mut watch::Receiver<ReadyState>) -> Result<()> {
        let budget = self.settings.ready_poll_interval * self.settings.ready_poll_attempts;
        let ready = timeout(budget, async {
            state
                .wait_for(|s| *s != ReadyState::Connecting)
                .await
                .map(|s| *s)
        })
        .await;

        match ready {
            Ok(Ok(ReadyState::Open)) => Ok(()),
            Ok(Ok(other)) => Err(anyhow!("transport {other:?} before becoming ready")),
            Ok(Err(_)) => Err(anyhow!("transport dropped before becoming ready")),
            Err(_) => Err(anyhow!(
                "Maximum number of attempts exceeded ({} x {:?})",
                self.settings.ready_poll_attempts,
                self.settings.ready_poll_interval
            )),
        }
    }

    async fn pump(&self, link: &mut Link) {
        loop {
            tokio::select! {
                biased;
                frame = link.inbound.recv() => match frame {
                    Some(text) => self.dispatch(&text),
                    None => return,
                },
                changed = link.state.changed() => {
                    if changed.is_err() || link.state.borrow().is_terminal() {
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let Some(signature) = parse_notification(text) else {
            debug!("[{}] ignoring frame: {}", self.address, text);
            return;
        };

        debug!("[{}] notification sig={}", self.address, signature);
        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.handle(signature).await;
        });
    }
}

/// Keep-alive pings at a fixed interval while the transport is open.
async fn heartbeat(
    address: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    mut state: watch::Receiver<ReadyState>,
    every: Duration,
) {
    info!("[{address}] Ping started");
    let mut ticker = interval_at(Instant::now() + every, every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = *state.borrow();
                match current {
                    ReadyState::Open => {
                        if outbound.send(Outbound::Ping(Vec::new())).is_err() {
                            warn!("[{address}] Ping error: transport gone, stopping ping");
                            return;
                        }
                    }
                    ReadyState::Connecting => {}
                    ReadyState::Closing | ReadyState::Closed => {
                        info!("[{address}] WebSocket closed or closing, stopping ping");
                        return;
                    }
                }
            }
            changed = state.changed() => {
                if changed.is_err() || state.borrow().is_terminal() {
                    info!("[{address}] WebSocket closed or closing, stopping ping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ADDRESS: &str = "TraderWallet1111111111111111111111111111";

    #[derive(Debug, Clone, Copy)]
    enum Behavior {
        /// connection refused
        Refuse,
        Accept,
        /// connects but never reports ready
        Stall,
        /// handshake takes this long, then the link is open
        SlowHandshake(Duration),
    }

    struct Peer {
        outbound: mpsc::UnboundedReceiver<Outbound>,
        inbound: mpsc::UnboundedSender<String>,
        state: watch::Sender<ReadyState>,
        opened_at: Instant,
    }

    struct MockTransport {
        script: Mutex<VecDeque<Behavior>>,
        fallback: Behavior,
        peers: mpsc::UnboundedSender<Peer>,
        opens: Arc<AtomicU32>,
    }

    impl MockTransport {
        fn new(
            script: Vec<Behavior>,
            fallback: Behavior,
        ) -> (Self, mpsc::UnboundedReceiver<Peer>, Arc<AtomicU32>) {
            let (peers, peer_rx) = mpsc::unbounded_channel();
            let opens = Arc::new(AtomicU32::new(0));
            let transport = Self {
                script: Mutex::new(script.into()),
                fallback,
                peers,
                opens: opens.clone(),
            };
            (transport, peer_rx, opens)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self, _url: &str) -> Result<Link> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let behavior = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback);

            let initial = match behavior {
                Behavior::Refuse => ReadyState::Closed,
                Behavior::Accept => ReadyState::Open,
                Behavior::Stall => ReadyState::Connecting,
                Behavior::SlowHandshake(took) => {
                    sleep(took).await;
                    ReadyState::Open
                }
            };

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (state_tx, state_rx) = watch::channel(initial);

            let _ = self.peers.send(Peer {
                outbound: out_rx,
                inbound: in_tx,
                state: state_tx,
                opened_at: Instant::now(),
            });

            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
                state: state_rx,
            })
        }
    }

    struct Recorder {
        seen: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl SignatureHandler for Recorder {
        async fn handle(&self, signature: String) {
            if signature == "SLOW" {
                sleep(Duration::from_secs(3600)).await;
            }
            let _ = self.seen.send(signature);
        }
    }

    fn settings(max_reconnect_attempts: u32) -> SubscriptionSettings {
        SubscriptionSettings {
            commitment: Commitment::Confirmed,
            max_reconnect_attempts,
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            ready_poll_attempts: 10,
            ready_poll_interval: Duration::from_millis(200),
        }
    }

    fn manager(
        transport: MockTransport,
        max_reconnect_attempts: u32,
    ) -> (SubscriptionManager<MockTransport>, mpsc::UnboundedReceiver<String>) {
        let (seen, seen_rx) = mpsc::unbounded_channel();
        let m = SubscriptionManager::new(
            "ws://test".to_string(),
            ADDRESS.to_string(),
            settings(max_reconnect_attempts),
            transport,
            Arc::new(Recorder { seen }),
        );
        (m, seen_rx)
    }

    /// Paused-clock timers still round to the millisecond.
    fn assert_near(actual: Duration, expected: Duration) {
        let slack = Duration::from_millis(10);
        assert!(
            actual >= expected && actual <= expected + slack,
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn notification(signature: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": {
                "result": {
                    "context": {"slot": 5208469},
                    "value": {"signature": signature, "err": null, "logs": []}
                },
                "subscription": 24040
            }
        })
        .to_string()
    }

    #[test]
    fn test_subscribe_request_shape() {
        let req = subscribe_request(ADDRESS, Commitment::Confirmed);
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["id"], 1);
        assert_eq!(req["method"], "logsSubscribe");
        assert_eq!(req["params"][0]["mentions"][0], ADDRESS);
        assert_eq!(req["params"][1]["commitment"], "confirmed");
    }

    #[test]
    fn test_parse_notification() {
        assert_eq!(parse_notification(&notification("SIG1")), Some("SIG1".to_string()));
        // subscription ack
        assert_eq!(parse_notification(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#), None);
        assert_eq!(parse_notification("not json"), None);
        assert_eq!(parse_notification(r#"{"params":{"result":{"value":{}}}}"#), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_reconnect_attempts() {
        let (transport, mut peers, opens) = MockTransport::new(vec![], Behavior::Refuse);
        let (m, _seen) = manager(transport, 5);
        let state = m.state();

        let started = Instant::now();
        let result = m.run().await;

        assert!(result.is_err());
        assert_eq!(*state.borrow(), SessionState::Stopped);

        // initial attempt + 5 reconnects
        assert_eq!(opens.load(Ordering::SeqCst), 6);

        let mut times = vec![];
        while let Ok(peer) = peers.try_recv() {
            times.push(peer.opened_at.duration_since(started));
        }
        assert_eq!(times.len(), 6);
        for pair in times.windows(2) {
            assert_near(pair[1] - pair[0], Duration::from_secs(5));
        }

        sleep(Duration::from_secs(600)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_resets_once_active() {
        let (transport, mut peers, opens) = MockTransport::new(
            vec![Behavior::Refuse, Behavior::Refuse, Behavior::Accept],
            Behavior::Refuse,
        );
        let (m, _seen) = manager(transport, 2);
        let run = tokio::spawn(m.run());

        // third connection is accepted, then dropped by the server
        let _first = peers.recv().await.unwrap();
        let _second = peers.recv().await.unwrap();
        let mut third = peers.recv().await.unwrap();
        assert!(matches!(third.outbound.recv().await, Some(Outbound::Text(_))));
        third.state.send_replace(ReadyState::Closed);

        assert!(run.await.unwrap().is_err());
        // 3 opens to reach Active, then a fresh budget of 2 retries
        assert_eq!(opens.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_wait_is_bounded() {
        let (transport, mut peers, opens) = MockTransport::new(vec![], Behavior::Stall);
        let (m, _seen) = manager(transport, 1);

        let started = Instant::now();
        assert!(m.run().await.is_err());

        assert_eq!(opens.load(Ordering::SeqCst), 2);
        // 2s readiness budget, 5s delay, 2s readiness budget
        assert_near(started.elapsed(), Duration::from_secs(9));

        while let Ok(mut peer) = peers.try_recv() {
            assert!(peer.outbound.try_recv().is_err(), "nothing sent before ready");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handshake_is_not_charged_to_readiness() {
        // handshake alone outlasts the 2s readiness budget
        let (transport, mut peers, opens) =
            MockTransport::new(vec![Behavior::SlowHandshake(Duration::from_secs(3))], Behavior::Refuse);
        let (m, _seen) = manager(transport, 5);
        let state = m.state();
        let started = Instant::now();
        tokio::spawn(m.run());

        let mut peer = peers.recv().await.unwrap();
        assert_near(peer.opened_at.duration_since(started), Duration::from_secs(3));
        match peer.outbound.recv().await {
            Some(Outbound::Text(text)) => assert!(text.contains("logsSubscribe")),
            other => panic!("expected subscribe request, got {other:?}"),
        }

        sleep(Duration::from_secs(10)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(*state.borrow(), SessionState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_runs_while_open_and_stops_on_close() {
        let (transport, mut peers, _opens) = MockTransport::new(vec![], Behavior::Accept);
        let (m, _seen) = manager(transport, 5);
        tokio::spawn(m.run());

        let mut peer = peers.recv().await.unwrap();
        match peer.outbound.recv().await {
            Some(Outbound::Text(text)) => {
                assert!(text.contains("logsSubscribe"));
                assert!(text.contains(ADDRESS));
            }
            other => panic!("expected subscribe request, got {other:?}"),
        }

        for n in 1..=3u32 {
            assert_eq!(peer.outbound.recv().await, Some(Outbound::Ping(Vec::new())));
            assert_near(peer.opened_at.elapsed(), Duration::from_secs(60) * n);
        }

        peer.state.send_replace(ReadyState::Closed);
        sleep(Duration::from_secs(600)).await;

        while let Ok(msg) = peer.outbound.try_recv() {
            assert!(!matches!(msg, Outbound::Ping(_)), "ping after close");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_failure_does_not_force_reconnect() {
        let (transport, mut peers, opens) = MockTransport::new(vec![], Behavior::Accept);
        let (m, _seen) = manager(transport, 5);
        let state = m.state();
        tokio::spawn(m.run());

        let mut peer = peers.recv().await.unwrap();
        assert!(matches!(peer.outbound.recv().await, Some(Outbound::Text(_))));
        // the far end stops accepting frames but the socket stays open
        drop(peer.outbound);

        sleep(Duration::from_secs(300)).await;
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(*state.borrow(), SessionState::Active);

        // a later close still drives the failure path
        peer.state.send_replace(ReadyState::Closed);
        let _next = peers.recv().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_are_dispatched_without_blocking() {
        let (transport, mut peers, _opens) = MockTransport::new(vec![], Behavior::Accept);
        let (m, mut seen) = manager(transport, 5);
        tokio::spawn(m.run());

        let peer = peers.recv().await.unwrap();
        peer.inbound
            .send(r#"{"jsonrpc":"2.0","result":24040,"id":1}"#.to_string())
            .unwrap();
        peer.inbound.send(notification("SLOW")).unwrap();
        peer.inbound.send("garbage".to_string()).unwrap();
        peer.inbound.send(notification("SIG1")).unwrap();
        peer.inbound.send(notification("SIG2")).unwrap();

        let mut got = vec![
            timeout(Duration::from_secs(1), seen.recv()).await.unwrap().unwrap(),
            timeout(Duration::from_secs(1), seen.recv()).await.unwrap().unwrap(),
        ];
        got.sort();
        assert_eq!(got, vec!["SIG1".to_string(), "SIG2".to_string()]);

        // the slow pipeline still completes, exactly once
        assert_eq!(seen.recv().await.unwrap(), "SLOW");
        assert!(timeout(Duration::from_secs(10), seen.recv()).await.is_err());
    }
}
