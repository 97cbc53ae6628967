use {
    super::*,
    std::sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    std::time::Duration,
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpStream,
        sync::{Mutex, broadcast, mpsc},
    },
    snafu::ResultExt,
    tracing::{debug, info, warn},
};

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("connect to {address} timed out"))]
    ConnectTimeout { address: String },
    #[snafu(display("io error talking to {address}: {source}"))]
    Io {
        address: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize request: {source}"))]
    Serialization { source: serde_json::Error },
    #[snafu(display("not connected"))]
    NotConnected,
    #[snafu(display("protocol error: {message}"))]
    Protocol { message: String },
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub pool_url: String,
    pub pool_port: u16,
    pub connect_timeout: Duration,
    pub keepalive: Duration,
}

impl ClientConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.pool_url, self.pool_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_url: "solo.ckpool.org".to_string(),
            pool_port: 3333,
            connect_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
        }
    }
}

/// The connection phases from §3: monotonic within a connection, reset to
/// `Disconnected` on any transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Authorized,
}

#[derive(Debug, Default)]
struct Shared {
    state: Option<ConnectionState>,
    extranonce1: Option<Extranonce>,
    extranonce2_size: Option<usize>,
    current_job: Option<Notify>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.state.unwrap_or(ConnectionState::Disconnected)
    }
}

/// A `mining.subscribe`/`mining.authorize`/`mining.notify`/`mining.submit`
/// client: one TCP connection, line-framed JSON-RPC, driven by a single
/// read/write actor task so the socket is never touched from two places at
/// once.
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    id_counter: Arc<AtomicU64>,
    shared: Arc<Mutex<Shared>>,
    outbox: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
    events: broadcast::Sender<Event>,
}

impl Client {
    pub fn new(config: ClientConfig) -> (Self, EventReceiver) {
        let (events, rx) = broadcast::channel(256);
        let client = Self {
            config: Arc::new(config),
            id_counter: Arc::new(AtomicU64::new(3)),
            shared: Arc::new(Mutex::new(Shared::default())),
            outbox: Arc::new(Mutex::new(None)),
            events,
        };
        (client, rx)
    }

    pub fn subscribe_events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub async fn state(&self) -> ConnectionState {
        self.shared.lock().await.state()
    }

    pub async fn current_job(&self) -> Option<Notify> {
        self.shared.lock().await.current_job.clone()
    }

    pub async fn extranonce(&self) -> Option<(Extranonce, usize)> {
        let shared = self.shared.lock().await;
        match (&shared.extranonce1, shared.extranonce2_size) {
            (Some(e1), Some(size)) => Some((e1.clone(), size)),
            _ => None,
        }
    }

    pub async fn connect(&self) -> ClientResult<()> {
        {
            let mut shared = self.shared.lock().await;
            shared.state = Some(ConnectionState::Connecting);
        }

        let address = self.config.address();

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                address: address.clone(),
            })?
            .context(IoSnafu {
                address: address.clone(),
            })?;

        let _ = stream.set_nodelay(true);

        let (tx, rx) = mpsc::channel(64);
        *self.outbox.lock().await = Some(tx);

        {
            let mut shared = self.shared.lock().await;
            shared.state = Some(ConnectionState::Connected);
        }

        info!(address, "stratum client connected");

        let actor = ConnectionActor {
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        tokio::spawn(actor.run(stream, rx));

        Ok(())
    }

    async fn send(&self, message: Message) -> ClientResult<()> {
        let outbox = self.outbox.lock().await;
        let tx = outbox.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(message).await.map_err(|_| ClientError::NotConnected)
    }

    pub async fn subscribe(&self) -> ClientResult<()> {
        self.send(Message::request(1, "mining.subscribe", serde_json::json!([])))
            .await
    }

    pub async fn authorize(&self, username: &str, password: &str) -> ClientResult<()> {
        let password = if password.is_empty() { "x" } else { password };
        self.send(Message::request(
            2,
            "mining.authorize",
            serde_json::json!([username, password]),
        ))
        .await
    }

    pub async fn submit(
        &self,
        username: &str,
        job_id: &str,
        extranonce2: &Extranonce,
        ntime: Ntime,
        nonce: Nonce,
    ) -> ClientResult<u64> {
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        self.send(Message::request(
            id,
            "mining.submit",
            serde_json::json!([
                username,
                job_id,
                extranonce2.to_hex(),
                ntime.to_string(),
                nonce.to_string(),
            ]),
        ))
        .await?;
        Ok(id)
    }

    pub async fn close(&self) -> ClientResult<()> {
        self.outbox.lock().await.take();

        let mut shared = self.shared.lock().await;
        shared.state = Some(ConnectionState::Disconnected);
        drop(shared);

        let _ = self.events.send(Event::Disconnected);
        Ok(())
    }
}

struct ConnectionActor {
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<Event>,
}

impl ConnectionActor {
    async fn run(self, stream: TcpStream, mut rx: mpsc::Receiver<Message>) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::with_capacity(MAX_MESSAGE_SIZE, read_half);
        let mut line = String::new();

        let _ = self.events.send(Event::Connected);

        loop {
            line.clear();

            tokio::select! {
                outgoing = rx.recv() => {
                    match outgoing {
                        Some(message) => {
                            if let Err(error) = self.write_message(&mut write_half, &message).await {
                                warn!(%error, "stratum write failed");
                                break;
                            }
                        }
                        None => break,
                    }
                }
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => {
                            debug!("stratum connection closed by peer");
                            break;
                        }
                        Ok(_) => {
                            self.handle_line(&line).await;
                        }
                        Err(error) => {
                            warn!(%error, "stratum read failed");
                            break;
                        }
                    }
                }
            }
        }

        let mut shared = self.shared.lock().await;
        shared.state = Some(ConnectionState::Disconnected);
        drop(shared);

        let _ = self.events.send(Event::Disconnected);
    }

    async fn write_message(
        &self,
        writer: &mut tokio::net::tcp::OwnedWriteHalf,
        message: &Message,
    ) -> std::io::Result<()> {
        let mut encoded = serde_json::to_vec(message)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await
    }

    async fn handle_line(&self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let parsed: Message = match serde_json::from_str(trimmed) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, line = trimmed, "dropping malformed stratum message");
                return;
            }
        };

        match parsed {
            Message::Response { id: 1, result, error } => self.handle_subscribe_response(result, error).await,
            Message::Response { id: 2, result, error } => self.handle_authorize_response(result, error).await,
            Message::Response { id, result, error } => {
                let accepted = error.is_none() && matches!(result, Some(Value::Bool(true)));
                let _ = self.events.send(Event::SubmitResult { id, accepted });
            }
            Message::Notification { method, params } => self.handle_notification(&method, &params).await,
            Message::Request { .. } => {}
        }
    }

    async fn handle_subscribe_response(&self, result: Option<Value>, error: Option<Value>) {
        if error.is_some() {
            return;
        }

        let Some(result) = result else { return };
        let Some(array) = result.as_array() else { return };
        if array.len() < 3 {
            return;
        }

        let Some(extranonce1) = array[1].as_str().and_then(|s| s.parse::<Extranonce>().ok()) else {
            return;
        };
        let Some(extranonce2_size) = array[2].as_u64() else {
            return;
        };
        let extranonce2_size = extranonce2_size as usize;

        {
            let mut shared = self.shared.lock().await;
            shared.extranonce1 = Some(extranonce1.clone());
            shared.extranonce2_size = Some(extranonce2_size);
            shared.state = Some(ConnectionState::Subscribed);
        }

        let _ = self.events.send(Event::Subscribed {
            extranonce1,
            extranonce2_size,
        });
    }

    async fn handle_authorize_response(&self, result: Option<Value>, error: Option<Value>) {
        let authorized = error.is_none() && matches!(result, Some(Value::Bool(true)));

        if authorized {
            let mut shared = self.shared.lock().await;
            shared.state = Some(ConnectionState::Authorized);
        }

        let _ = self.events.send(Event::Authorized(authorized));
    }

    async fn handle_notification(&self, method: &str, params: &Value) {
        match method {
            "mining.notify" => {
                let Some(notify) = Notify::from_params(params) else {
                    return;
                };

                {
                    let mut shared = self.shared.lock().await;
                    shared.current_job = Some(notify.clone());
                }

                let _ = self.events.send(Event::Job(notify));
            }
            "mining.set_difficulty" => {
                if let Some(value) = params.as_array().and_then(|a| a.first()).and_then(Value::as_f64) {
                    let _ = self.events.send(Event::SetDifficulty(value));
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        tokio::{io::AsyncWriteExt as _, net::TcpListener},
    };

    async fn pool_and_client() -> (TcpListener, Client, EventReceiver) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (client, rx) = Client::new(ClientConfig {
            pool_url: "127.0.0.1".to_string(),
            pool_port: port,
            connect_timeout: Duration::from_secs(1),
            keepalive: Duration::from_secs(30),
        });

        (listener, client, rx)
    }

    #[tokio::test]
    async fn subscribe_response_stores_extranonce_and_transitions_state() {
        let (listener, client, mut events) = pool_and_client().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            assert!(line.contains("mining.subscribe"));

            write_half
                .write_all(b"{\"id\":1,\"result\":[[[\"mining.notify\",\"abc\"]],\"81000001\",4],\"error\":null}\n")
                .await
                .unwrap();

            line.clear();
            let _ = reader.read_line(&mut line).await;
        });

        client.connect().await.unwrap();
        client.subscribe().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, Event::Connected));

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();

        match event {
            Event::Subscribed {
                extranonce1,
                extranonce2_size,
            } => {
                assert_eq!(extranonce1.to_hex(), "81000001");
                assert_eq!(extranonce2_size, 4);
            }
            other => panic!("expected Subscribed, got {other:?}"),
        }

        assert_eq!(client.state().await, ConnectionState::Subscribed);
        let (e1, size) = client.extranonce().await.unwrap();
        assert_eq!(e1.to_hex(), "81000001");
        assert_eq!(size, 4);

        client.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn notify_updates_current_job_and_emits_event() {
        let (listener, client, mut events) = pool_and_client().await;

        let envelope = serde_json::json!({
            "id": null,
            "method": "mining.notify",
            "params": ["jobA", "00".repeat(32), "", "", [], "00000002", "1d00ffff", "00000000", true],
        });
        let notify_line = format!("{}\n", serde_json::to_string(&envelope).unwrap());

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_read_half, mut write_half) = stream.into_split();
            write_half.write_all(notify_line.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        client.connect().await.unwrap();

        let _connected = events.recv().await.unwrap();
        let job_event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();

        match job_event {
            Event::Job(notify) => assert_eq!(notify.job_id, "jobA"),
            other => panic!("expected Job, got {other:?}"),
        }

        assert_eq!(client.current_job().await.unwrap().job_id, "jobA");

        client.close().await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn close_transitions_to_disconnected() {
        let (listener, client, mut events) = pool_and_client().await;
        let server = tokio::spawn(async move {
            let _ = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        client.connect().await.unwrap();
        let _ = events.recv().await.unwrap();

        client.close().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Disconnected);

        assert!(client.submit("w", "j", &Extranonce::generate(4), Ntime(0), Nonce(0)).await.is_err());

        server.abort();
    }
}
