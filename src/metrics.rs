//! Prometheus-compatible metrics endpoint.
//!
//! The engine task updates the gauges once per tick; the HTTP health
//! handler reads the same atomics, so no request ever touches the game
//! state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the arena server.
#[derive(Debug)]
pub struct Metrics {
    // Population
    pub players_total: AtomicU64,
    pub players_ai: AtomicU64,
    pub tanks_alive: AtomicU64,

    // Entities
    pub shell_count: AtomicU64,
    pub upgrade_count: AtomicU64,
    pub tree_count: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    /// Steps dropped by the catch-up cap
    pub skipped_frames: AtomicU64,
    /// Percentage of steps in which the AI pass actually ran
    pub ai_exec_percent: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,

    // Game clock, in whole seconds
    pub game_time_seconds: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players_total: AtomicU64::new(0),
            players_ai: AtomicU64::new(0),
            tanks_alive: AtomicU64::new(0),
            shell_count: AtomicU64::new(0),
            upgrade_count: AtomicU64::new(0),
            tree_count: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            skipped_frames: AtomicU64::new(0),
            ai_exec_percent: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            game_time_seconds: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record one tick duration and refresh the rolling percentiles.
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = ((sorted.len() as f32 * 0.95) as usize).min(sorted.len() - 1);
            self.tick_time_p95_us
                .store(sorted[p95_idx], Ordering::Relaxed);
            self.tick_time_max_us
                .store(*sorted.last().unwrap(), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prometheus text exposition.
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!(
            "tank_arena_players_total",
            "Total connected players (humans and AI)",
            "gauge",
            self.players_total.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_players_ai",
            "AI players",
            "gauge",
            self.players_ai.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_tanks_alive",
            "Tanks currently alive",
            "gauge",
            self.tanks_alive.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_shells",
            "Shells in flight",
            "gauge",
            self.shell_count.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_upgrades",
            "Upgrades on the ground",
            "gauge",
            self.upgrade_count.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_trees",
            "Trees in the arena",
            "gauge",
            self.tree_count.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_tick_time_us",
            "Last tick duration in microseconds",
            "gauge",
            self.tick_time_us.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_tick_time_p95_us",
            "95th percentile tick duration",
            "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_tick_time_max_us",
            "Max tick duration in the rolling window",
            "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_ticks_total",
            "Simulation steps executed",
            "counter",
            self.tick_count.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_skipped_frames_total",
            "Steps dropped by the catch-up cap",
            "counter",
            self.skipped_frames.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_ai_exec_percent",
            "Percentage of steps with an AI pass",
            "gauge",
            self.ai_exec_percent.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_connections",
            "Active WebSocket connections",
            "gauge",
            self.connections_active.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_messages_sent_total",
            "Messages sent to clients",
            "counter",
            self.messages_sent.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_messages_received_total",
            "Messages received from clients",
            "counter",
            self.messages_received.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_game_time_seconds",
            "Simulated game time",
            "gauge",
            self.game_time_seconds.load(Ordering::Relaxed)
        );
        metric!(
            "tank_arena_uptime_seconds",
            "Process uptime",
            "counter",
            self.uptime_seconds()
        );

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal HTTP listener for the metrics port.
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /") {
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK".to_string()
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}
