//! Simulated game session.
//!
//! A "network" thread announces joining players while the host's main loop
//! chats, ticks and saves the world. Handlers are spread across four places:
//! inline on the publisher, the main-loop [`Scheduler`], a dedicated I/O
//! [`SchedulerThread`] and a [`TokioContext`].

use crate::config::AppConfig;
use event_bus::{
    cancellable_event, create_event_bus_with_config, subscribe, BusStats, Cancellable, Event,
    EventBus, EventError, EventPriority, Subscriber, Subscriptions,
};
use event_scheduler::{Scheduler, SchedulerThread, TokioContext};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Context names handlers can ask for.
pub const MAIN_CONTEXT: &str = "main";
pub const IO_CONTEXT: &str = "io";
pub const ASYNC_CONTEXT: &str = "async";

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlayerJoined {
    pub name: String,
}
impl Event for PlayerJoined {}

#[derive(Debug, Clone, Default)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    cancelled: bool,
}
cancellable_event!(ChatMessage, cancelled);

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorldSaved {
    pub round: u32,
}
impl Event for WorldSaved {}

// ============================================================================
// Subscribers
// ============================================================================

/// Cancels chat messages containing a banned word.
pub struct ChatModerator {
    banned: Vec<String>,
}

impl ChatModerator {
    fn moderate(&self, msg: &mut ChatMessage) -> anyhow::Result<()> {
        let lowered = msg.text.to_lowercase();
        if self.banned.iter().any(|word| lowered.contains(word.as_str())) {
            debug!("🚫 Blocked message from {}", msg.sender);
            msg.set_cancelled(true);
        }
        Ok(())
    }
}

impl Subscriber for ChatModerator {
    fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError> {
        if self.banned.is_empty() {
            return Err(subs.reject("no banned words configured"));
        }
        subscribe!(subs, self;
            ChatMessage => moderate { priority: EventPriority::HIGH },
        );
        Ok(())
    }
}

/// Sees every chat message, cancelled or not.
#[derive(Default)]
pub struct ChatLog {
    delivered: AtomicU32,
    blocked: AtomicU32,
}

impl ChatLog {
    fn record(&self, msg: &mut ChatMessage) -> anyhow::Result<()> {
        if msg.is_cancelled() {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            debug!("💬 <{}> {}", msg.sender, msg.text);
        }
        Ok(())
    }
}

impl Subscriber for ChatLog {
    fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError> {
        subscribe!(subs, self;
            ChatMessage => record { priority: EventPriority::LOWEST, ignore_cancelled: true },
        );
        Ok(())
    }
}

/// Reacts to players joining: greets them in chat (a nested publish), spawns
/// them on the main loop and records analytics on the async runtime.
pub struct Lobby {
    bus: Weak<EventBus>,
    spawned: Mutex<Vec<String>>,
    analysed: AtomicU32,
}

impl Lobby {
    fn greet(&self, event: &mut PlayerJoined) -> anyhow::Result<()> {
        if let Some(bus) = self.bus.upgrade() {
            let mut welcome = ChatMessage::new("server", format!("Welcome, {}!", event.name));
            bus.publish(&mut welcome)?;
        }
        Ok(())
    }

    fn spawn_player(&self, event: &mut PlayerJoined) -> anyhow::Result<()> {
        info!("🧍 Spawning {}", event.name);
        self.spawned
            .lock()
            .map_err(|_| anyhow::anyhow!("player list poisoned"))?
            .push(event.name.clone());
        Ok(())
    }

    fn analyse(&self, event: &mut PlayerJoined) -> anyhow::Result<()> {
        debug!("📈 Recorded join of {}", event.name);
        self.analysed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Subscriber for Lobby {
    fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError> {
        subscribe!(subs, self;
            PlayerJoined => greet { priority: EventPriority::HIGH },
            PlayerJoined => spawn_player @ "main",
            PlayerJoined => analyse { priority: EventPriority::LOW } @ "async",
        );
        Ok(())
    }
}

/// Writes world saves on the I/O thread.
#[derive(Default)]
pub struct Persistence {
    saved: AtomicU32,
}

impl Persistence {
    fn persist(&self, event: &mut WorldSaved) -> anyhow::Result<()> {
        // stand-in for disk I/O
        thread::sleep(Duration::from_millis(1));
        debug!("💾 Persisted world at round {}", event.round);
        self.saved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Subscriber for Persistence {
    fn subscribe(self: Arc<Self>, subs: &mut Subscriptions) -> Result<(), EventError> {
        subscribe!(subs, self;
            WorldSaved => persist @ "io",
        );
        Ok(())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Summary printed at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub rounds: u32,
    pub players_spawned: usize,
    pub joins_analysed: u32,
    pub chats_delivered: u32,
    pub chats_blocked: u32,
    pub worlds_persisted: u32,
    /// Handlers removed when the subscribers were torn down
    pub handlers_removed: usize,
    pub bus: BusStats,
}

/// Runs the simulated session to completion.
///
/// Blocks the calling thread, which becomes the main loop. Async handlers
/// are spawned onto `runtime`, so this must not be called from inside one
/// of its async tasks; use `spawn_blocking`.
pub fn run(config: &AppConfig, runtime: Handle) -> anyhow::Result<DemoReport> {
    let started = Instant::now();
    let bus = create_event_bus_with_config(config.bus.clone());

    let main_loop = Arc::new(Scheduler::new(MAIN_CONTEXT));
    main_loop.bind_current_thread()?;
    let io = Arc::new(SchedulerThread::spawn(config.scheduler.thread_name.clone())?);
    let async_context = Arc::new(TokioContext::new(ASYNC_CONTEXT, runtime));

    bus.add_context(MAIN_CONTEXT, main_loop.clone());
    bus.add_context(IO_CONTEXT, io.clone());
    bus.add_context(ASYNC_CONTEXT, async_context);

    let moderator = Arc::new(ChatModerator {
        banned: config.demo.banned_words.iter().map(|w| w.to_lowercase()).collect(),
    });
    let chat_log = Arc::new(ChatLog::default());
    let lobby = Arc::new(Lobby {
        bus: Arc::downgrade(&bus),
        spawned: Mutex::new(Vec::new()),
        analysed: AtomicU32::new(0),
    });
    let persistence = Arc::new(Persistence::default());

    bus.register_subscriber(moderator.clone())?;
    bus.register_subscriber(chat_log.clone())?;
    bus.register_subscriber(lobby.clone())?;
    bus.register_subscriber(persistence.clone())?;
    info!(
        "📋 {} handler(s) registered for {:?}",
        bus.handler_count(),
        bus.registered_event_types()
    );

    let rounds = config.demo.rounds;
    for round in 0..rounds {
        // players arrive on the network thread
        thread::scope(|scope| {
            let bus = &bus;
            scope
                .spawn(move || {
                    let mut joined = PlayerJoined {
                        name: format!("player-{round}"),
                    };
                    bus.publish(&mut joined)
                })
                .join()
        })
        .map_err(|_| anyhow::anyhow!("network thread panicked"))??;

        let text = if round % 3 == 2 {
            "cheap spam, click here".to_string()
        } else {
            format!("gg round {round}")
        };
        let mut chat = ChatMessage::new(format!("player-{round}"), text);
        if bus.publish(&mut chat)? {
            warn!("Message from {} was blocked", chat.sender);
        }

        let ran = main_loop.process_tasks()?;
        debug!("Tick {} ran {} scheduled task(s)", round, ran);

        bus.publish(&mut WorldSaved { round })?;
    }

    io.shutdown();
    wait_for(|| lobby.analysed.load(Ordering::Relaxed) >= rounds);

    let mut handlers_removed = 0;
    handlers_removed += bus.unregister_subscriber(&moderator)?;
    handlers_removed += bus.unregister_subscriber(&chat_log)?;
    handlers_removed += bus.unregister_subscriber(&lobby)?;
    handlers_removed += bus.unregister_subscriber(&persistence)?;

    let players_spawned = lobby
        .spawned
        .lock()
        .map_err(|_| anyhow::anyhow!("player list poisoned"))?
        .len();

    let report = DemoReport {
        rounds,
        players_spawned,
        joins_analysed: lobby.analysed.load(Ordering::Relaxed),
        chats_delivered: chat_log.delivered.load(Ordering::Relaxed),
        chats_blocked: chat_log.blocked.load(Ordering::Relaxed),
        worlds_persisted: persistence.saved.load(Ordering::Relaxed),
        handlers_removed,
        bus: bus.stats(),
    };
    info!("✅ Session finished in {:.2?}", started.elapsed());
    Ok(report)
}

/// Polls `done` for up to two seconds.
fn wait_for(done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        if Instant::now() >= deadline {
            warn!("⚠️ Timed out waiting for async handlers");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_demo(config: AppConfig) -> DemoReport {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || run(&config, handle))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_session_counts_are_consistent() {
        let mut config = AppConfig::default();
        config.demo.rounds = 6;
        let report = run_demo(config).await;

        assert_eq!(report.rounds, 6);
        assert_eq!(report.players_spawned, 6);
        assert_eq!(report.joins_analysed, 6);
        assert_eq!(report.worlds_persisted, 6);
        // one welcome per player plus one chat per round, rounds 2 and 5 are spam
        assert_eq!(report.chats_delivered, 10);
        assert_eq!(report.chats_blocked, 2);
        assert_eq!(report.handlers_removed, 6);

        assert_eq!(report.bus.handler_failures, 0);
        assert_eq!(report.bus.active_handlers, 0);
        // spawn_player, analyse and persist are handed off every round
        assert_eq!(report.bus.handlers_deferred, 18);
    }

    #[test]
    fn test_moderator_requires_banned_words() {
        let bus = EventBus::new();
        let err = bus
            .register_subscriber(Arc::new(ChatModerator { banned: Vec::new() }))
            .unwrap_err();
        assert!(err.to_string().contains("no banned words configured"));
    }

    #[test]
    fn test_moderation_and_logging() {
        let bus = EventBus::new();
        bus.register_subscriber(Arc::new(ChatModerator {
            banned: vec!["spam".to_string()],
        }))
        .unwrap();
        let log = Arc::new(ChatLog::default());
        bus.register_subscriber(log.clone()).unwrap();

        assert!(bus.publish(&mut ChatMessage::new("eve", "SPAM!!")).unwrap());
        assert!(!bus.publish(&mut ChatMessage::new("bob", "hello")).unwrap());
        assert_eq!(log.blocked.load(Ordering::Relaxed), 1);
        assert_eq!(log.delivered.load(Ordering::Relaxed), 1);
    }
}
