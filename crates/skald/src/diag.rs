//! Diagnostics sender. Ships world metrics to `skald-telemetry` over UDP.
//!
//! Enabled by the `diagnostics` feature flag. Add a [`DiagnosticsSystem`]
//! to the world; once per tick (throttled to the configured interval) it
//! captures a [`WorldSnapshot`], serializes it to JSON and sends it as one
//! datagram to `127.0.0.1:9100`. Sending is fire-and-forget: nobody
//! listening is not an error.
//!
//! Call [`init_logger`] instead of `env_logger::init()` to also forward
//! log records to the dashboard.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::DiagnosticsConfig;
use crate::ecs::{Access, EntityWorld, System, SystemSchedule};

// ── DiagSender ───────────────────────────────────────────────────────────

/// Owns the outbound UDP socket and throttling state.
pub struct DiagSender {
    socket: UdpSocket,
    interval: Duration,
    /// Last time a datagram was sent.
    last_send: Option<Instant>,
}

impl DiagSender {
    /// Bind an ephemeral port and connect it to `address`. Returns `None`
    /// if the socket can't be set up.
    pub fn new(address: impl ToSocketAddrs, interval: Duration) -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect(address).ok()?;
        socket.set_nonblocking(true).ok()?;
        Some(Self {
            socket,
            interval,
            last_send: None,
        })
    }

    pub fn from_config(config: &DiagnosticsConfig) -> Option<Self> {
        Self::new(
            config.address.as_str(),
            Duration::from_millis(config.interval_ms),
        )
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.socket.peer_addr().ok()
    }

    /// True once the throttle interval has passed since the last send.
    pub fn ready(&self) -> bool {
        self.last_send
            .is_none_or(|last| last.elapsed() >= self.interval)
    }

    /// Serialize and send. Errors are swallowed.
    pub fn send(&mut self, snapshot: &WorldSnapshot) {
        self.last_send = Some(Instant::now());
        if let Ok(json) = serde_json::to_vec(snapshot) {
            let _ = self.socket.send(&json);
        }
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

/// Everything the dashboard shows, captured at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub elapsed_secs: f32,
    /// Sum of all callback durations in the last completed tick.
    pub systems_us: f64,
    pub entity_pool: EntityPoolSnapshot,
    pub containers: Vec<ContainerSnapshot>,
    pub groups: Vec<GroupSnapshot>,
    pub tags: Vec<TagSnapshot>,
    pub callbacks: Vec<CallbackSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntrySnapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPoolSnapshot {
    pub total_slots: usize,
    pub free_count: usize,
    pub alive_count: usize,
    pub fragmentation_pct: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub name: String,
    pub persistent: bool,
    pub count: usize,
    pub mutated: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub label: String,
    pub size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSnapshot {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackSnapshot {
    pub system: String,
    pub callback: String,
    pub phase: String,
    pub stage: usize,
    pub duration_us: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntrySnapshot {
    pub level: String,
    pub target: String,
    pub message: String,
    pub timestamp_secs: f32,
}

impl WorldSnapshot {
    /// Gather stats from `world`. Callback timings are those of the last
    /// completed tick.
    pub fn capture(world: &EntityWorld) -> Self {
        let pool = world.pool();
        let total_slots = pool.capacity();
        let free_count = pool.free_count();
        let fragmentation_pct = if total_slots > 0 {
            free_count as f32 / total_slots as f32 * 100.0
        } else {
            0.0
        };

        let containers = world
            .registry()
            .iter()
            .filter_map(|info| {
                let container = world.container_by_index(info.index())?;
                Some(ContainerSnapshot {
                    name: info.short_name().to_string(),
                    persistent: info.is_persistent(),
                    count: container.len(),
                    mutated: container.mutated_count(),
                    removed: container.removed_count(),
                })
            })
            .collect();

        let groups = world
            .group_infos()
            .iter()
            .map(|group| GroupSnapshot {
                label: group.label.clone(),
                size: group.membership.len(),
            })
            .collect();

        let tags = world
            .matrix
            .tag_names()
            .into_iter()
            .map(|name| TagSnapshot {
                count: world.with_tag(&name).len(),
                name,
            })
            .collect();

        let callbacks: Vec<CallbackSnapshot> = world
            .callback_timings()
            .iter()
            .map(|t| CallbackSnapshot {
                system: t.system.clone(),
                callback: t.callback.clone(),
                phase: t.phase.to_string(),
                stage: t.stage,
                duration_us: t.duration_us,
            })
            .collect();

        Self {
            tick: 0,
            elapsed_secs: 0.0,
            systems_us: callbacks.iter().map(|c| c.duration_us).sum(),
            entity_pool: EntityPoolSnapshot {
                total_slots,
                free_count,
                alive_count: pool.len(),
                fragmentation_pct,
            },
            containers,
            groups,
            tags,
            callbacks,
            logs: Vec::new(),
        }
    }
}

// ── DiagnosticsSystem ────────────────────────────────────────────────────

/// Sends a [`WorldSnapshot`] at the end of every tick, throttled.
pub struct DiagnosticsSystem {
    config: DiagnosticsConfig,
    sender: Option<DiagSender>,
    started: Instant,
    ticks: u64,
    sent: u64,
}

impl DiagnosticsSystem {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self {
            config,
            sender: None,
            started: Instant::now(),
            ticks: 0,
            sent: 0,
        }
    }

    /// Snapshots sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn sender(&self) -> Option<&DiagSender> {
        self.sender.as_ref()
    }

    fn report(&mut self, world: &mut EntityWorld) {
        self.ticks += 1;
        let Some(sender) = self.sender.as_mut() else {
            return;
        };
        if !sender.ready() {
            return;
        }

        let mut snapshot = WorldSnapshot::capture(world);
        snapshot.tick = self.ticks;
        snapshot.elapsed_secs = self.started.elapsed().as_secs_f32();
        snapshot.logs = drain_captured_logs(50);
        sender.send(&snapshot);
        self.sent += 1;
    }
}

impl Default for DiagnosticsSystem {
    fn default() -> Self {
        Self::new(DiagnosticsConfig::default())
    }
}

impl System for DiagnosticsSystem {
    fn setup(&mut self, _world: &mut EntityWorld, schedule: &mut SystemSchedule<Self>) {
        if !self.config.enabled {
            log::debug!("diagnostics disabled");
            return;
        }
        self.sender = DiagSender::from_config(&self.config);
        match &self.sender {
            Some(_) => log::debug!("diagnostics sending to {}", self.config.address),
            None => log::warn!(
                "failed to open diagnostics socket for {}, telemetry disabled",
                self.config.address
            ),
        }
        self.started = Instant::now();

        // Reads every container, so it takes a stage of its own.
        schedule.on_post_tick("send_diagnostics", Access::exclusive(), Self::report);
    }
}

// ── Log Capture ──────────────────────────────────────────────────────────

const LOG_RING_CAP: usize = 500;

/// Ring buffer for captured logs.
struct LogRing {
    entries: Vec<LogEntrySnapshot>,
}

impl LogRing {
    fn push(&mut self, entry: LogEntrySnapshot) {
        if self.entries.len() >= LOG_RING_CAP {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<LogEntrySnapshot> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static LOG_RING: Mutex<Option<LogRing>> = Mutex::new(None);
static LOG_START: OnceLock<Instant> = OnceLock::new();

/// Captures records into the ring buffer and delegates to env_logger for
/// stderr output.
struct DiagLogger {
    inner: env_logger::Logger,
}

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        log::Log::enabled(&self.inner, metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.matches(record) {
            log::Log::log(&self.inner, record);
        }

        let entry = LogEntrySnapshot {
            level: record.level().to_string(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs: LOG_START.get().map_or(0.0, |s| s.elapsed().as_secs_f32()),
        };
        if let Some(ring) = LOG_RING.lock().as_mut() {
            ring.push(entry);
        }
    }

    fn flush(&self) {
        log::Log::flush(&self.inner);
    }
}

static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();

/// Install a logger that writes to stderr (filtered by `RUST_LOG`) and keeps
/// info-and-above records for the dashboard.
///
/// Call this early (before any log messages) to capture everything.
pub fn init_logger() {
    *LOG_RING.lock() = Some(LogRing {
        entries: Vec::new(),
    });
    LOG_START.get_or_init(Instant::now);

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });

    if log::set_logger(logger).is_err() {
        eprintln!("[skald] a logger is already set, log capture disabled");
        return;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
}

/// Drain up to `max` captured log entries.
fn drain_captured_logs(max: usize) -> Vec<LogEntrySnapshot> {
    LOG_RING
        .lock()
        .as_mut()
        .map(|ring| ring.drain(max))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, FnSystem, Phase};

    #[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
    struct Health(u32);
    struct Scratch;

    impl Component for Health {}
    impl Component for Scratch {}

    fn populated_world() -> EntityWorld {
        let mut world = EntityWorld::new();
        world.register_component_serde::<Health>();
        let ids: Vec<_> = (0..4).map(|_| world.create_entity()).collect();
        for &id in &ids {
            world.add_component(id, Health(10));
        }
        world.add_component(ids[0], Scratch);
        world.add_tag(ids[1], "boss");
        world.remove_entity(ids[3]);
        world.create_group::<&Health>(&[]);
        world
    }

    #[test]
    fn capture_reports_pool_containers_groups_and_tags() {
        let world = populated_world();
        let snapshot = WorldSnapshot::capture(&world);

        assert_eq!(snapshot.entity_pool.alive_count, 3);
        assert_eq!(snapshot.entity_pool.free_count, 1);
        assert_eq!(snapshot.entity_pool.total_slots, 4);
        assert!((snapshot.entity_pool.fragmentation_pct - 25.0).abs() < 1e-3);

        let health = snapshot.containers.iter().find(|c| c.name == "Health").unwrap();
        assert!(health.persistent);
        assert_eq!(health.count, 3);
        assert_eq!(health.mutated, 3);
        assert_eq!(health.removed, 1);
        let scratch = snapshot.containers.iter().find(|c| c.name == "Scratch").unwrap();
        assert!(!scratch.persistent);

        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].size, 3);
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].name, "boss");
        assert_eq!(snapshot.tags[0].count, 1);
    }

    #[test]
    fn capture_includes_last_tick_timings() {
        let mut world = populated_world();
        world.add_system(FnSystem::new("noop", Phase::Tick, Access::new(), |_: &mut EntityWorld| {}));
        world.tick();

        let snapshot = WorldSnapshot::capture(&world);
        assert_eq!(snapshot.callbacks.len(), 1);
        assert_eq!(snapshot.callbacks[0].callback, "noop");
        assert_eq!(snapshot.callbacks[0].phase, "tick");
    }

    #[test]
    fn sender_delivers_json_datagrams() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let mut world = EntityWorld::new();
        world.add_system(DiagnosticsSystem::new(DiagnosticsConfig {
            enabled: true,
            address: addr.to_string(),
            interval_ms: 0,
        }));
        world.create_entity();
        world.tick();

        let mut buf = [0u8; 65536];
        let n = listener.recv(&mut buf).unwrap();
        let snapshot: WorldSnapshot = serde_json::from_slice(&buf[..n]).unwrap();
        assert_eq!(snapshot.tick, 1);
        assert_eq!(snapshot.entity_pool.alive_count, 1);
        assert_eq!(world.find_system::<DiagnosticsSystem>().unwrap().sent(), 1);
    }

    #[test]
    fn sender_throttles() {
        let mut sender = DiagSender::new("127.0.0.1:9", Duration::from_secs(60)).unwrap();
        assert!(sender.ready());
        sender.send(&WorldSnapshot::default());
        assert!(!sender.ready());
    }

    #[test]
    fn diag_logger_keeps_info_even_when_stderr_is_silent() {
        let logger = DiagLogger {
            inner: env_logger::Builder::new()
                .filter_level(log::LevelFilter::Off)
                .build(),
        };
        let info = log::Metadata::builder().level(log::Level::Info).build();
        let trace = log::Metadata::builder().level(log::Level::Trace).build();
        assert!(log::Log::enabled(&logger, &info));
        assert!(!log::Log::enabled(&logger, &trace));
    }

    #[test]
    fn log_ring_drops_oldest_past_capacity() {
        let mut ring = LogRing {
            entries: Vec::new(),
        };
        for i in 0..LOG_RING_CAP + 2 {
            ring.push(LogEntrySnapshot {
                level: "INFO".into(),
                target: "skald".into(),
                message: i.to_string(),
                timestamp_secs: 0.0,
            });
        }
        let first = ring.drain(1);
        assert_eq!(first[0].message, "2");
        assert_eq!(ring.drain(usize::MAX).len(), LOG_RING_CAP - 1);
    }

    #[test]
    fn disabled_config_registers_nothing() {
        let mut world = EntityWorld::new();
        world.add_system(DiagnosticsSystem::new(DiagnosticsConfig {
            enabled: false,
            ..DiagnosticsConfig::default()
        }));
        assert!(world.stage_plan(Phase::PostTick).is_empty());
        assert!(world.find_system::<DiagnosticsSystem>().unwrap().sender().is_none());
    }
}
