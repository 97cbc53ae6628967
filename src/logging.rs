//! Logging (C9, added): `tracing` to stderr and an optional rolling file,
//! plus a broadcast layer that feeds the `/ws` `"log"` envelope stream.
use {
    serde::{Deserialize, Serialize},
    std::{
        collections::VecDeque,
        path::Path,
        sync::{Arc, Mutex},
    },
    tokio::sync::broadcast,
    tracing::{
        Event, Subscriber,
        field::{Field, Visit},
    },
    tracing_subscriber::{Layer, filter::EnvFilter, layer::Context, layer::SubscriberExt, util::SubscriberInitExt},
};

const LOG_BACKLOG: usize = 50;

/// One log line, as pushed over `/ws`'s `"log"` envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogLine {
    pub level: String,
    pub target: String,
    pub message: String,
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// A `tracing_subscriber::Layer` that mirrors every event into a broadcast
/// channel and a bounded backlog, for the WebSocket `/ws` log stream.
pub struct LogBroadcastLayer {
    sender: broadcast::Sender<LogLine>,
    backlog: Mutex<VecDeque<LogLine>>,
}

impl LogBroadcastLayer {
    pub fn new() -> (Self, broadcast::Receiver<LogLine>) {
        let (sender, receiver) = broadcast::channel(256);
        (
            Self {
                sender,
                backlog: Mutex::new(VecDeque::with_capacity(LOG_BACKLOG)),
            },
            receiver,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogLine> {
        self.sender.subscribe()
    }

    /// The last `LOG_BACKLOG` lines, oldest first, for replay to a new
    /// `/ws` subscriber.
    pub fn backlog(&self) -> Vec<LogLine> {
        self.backlog.lock().unwrap().iter().cloned().collect()
    }
}

impl<S: Subscriber> Layer<S> for LogBroadcastLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor { message: String::new() };
        event.record(&mut visitor);

        let line = LogLine {
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        };

        {
            let mut backlog = self.backlog.lock().unwrap();
            if backlog.len() >= LOG_BACKLOG {
                backlog.pop_front();
            }
            backlog.push_back(line.clone());
        }

        let _ = self.sender.send(line);
    }
}

/// Installs the global subscriber: an `EnvFilter` (default `info`, override
/// via `RUST_LOG`), an `fmt` layer to stderr, an optional rolling-file layer
/// when `log_dir` is configured, and the broadcast layer for `/ws`. Returns
/// a shared handle the server module subscribes to per WebSocket client.
pub fn init(log_dir: Option<&Path>) -> Arc<LogBroadcastLayer> {
    let (broadcast_layer, _unused_initial_receiver) = LogBroadcastLayer::new();
    let broadcast_layer = Arc::new(broadcast_layer);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(broadcast_layer.clone());

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "soloctl.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // Leak the guard: the logging layer must outlive every other
            // part of the process, and init() is called exactly once.
            std::mem::forget(guard);
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
        }
        None => {
            registry.init();
        }
    }

    broadcast_layer
}
