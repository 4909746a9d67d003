//! World task: owns the [`World`] and drives both tick rates, the timer
//! queue and client commands from one cooperative loop.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::GameConfig;
use crate::ws::channel::ClientChannel;
use crate::ws::protocol::ClientRequest;

use super::world::{Session, World};

const COMMAND_BUFFER: usize = 1024;

/// Messages from connection tasks into the world task
#[derive(Debug)]
pub enum WorldCommand {
    /// Spawn a player bound to `client`; its session is sent back on `respond`
    Connect {
        client: ClientChannel,
        respond: oneshot::Sender<Session>,
    },
    Request {
        session: Session,
        request_id: Option<u64>,
        request: ClientRequest,
    },
    Disconnect {
        session: Session,
    },
}

/// Counters published by the world task for the health endpoint
#[derive(Debug, Default)]
pub struct WorldStats {
    entities: AtomicUsize,
    players: AtomicUsize,
    ticks: AtomicU64,
}

impl WorldStats {
    pub fn entities(&self) -> usize {
        self.entities.load(Ordering::Relaxed)
    }

    pub fn players(&self) -> usize {
        self.players.load(Ordering::Relaxed)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn publish(&self, world: &World) {
        self.entities.store(world.entity_count(), Ordering::Relaxed);
        self.players.store(world.player_count(), Ordering::Relaxed);
        self.ticks.store(world.tick(), Ordering::Relaxed);
    }
}

/// Cloneable handle to the running world
#[derive(Clone)]
pub struct WorldHandle {
    commands: mpsc::Sender<WorldCommand>,
    stats: Arc<WorldStats>,
}

impl WorldHandle {
    /// Join the world. Returns `None` if the world task has stopped.
    pub async fn connect(&self, client: ClientChannel) -> Option<Session> {
        let (respond, session) = oneshot::channel();
        self.commands
            .send(WorldCommand::Connect { client, respond })
            .await
            .ok()?;
        session.await.ok()
    }

    /// Forward a decoded request. Returns false if the world task has stopped.
    pub async fn request(
        &self,
        session: Session,
        request_id: Option<u64>,
        request: ClientRequest,
    ) -> bool {
        self.commands
            .send(WorldCommand::Request {
                session,
                request_id,
                request,
            })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, session: Session) {
        let _ = self
            .commands
            .send(WorldCommand::Disconnect { session })
            .await;
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }
}

pub struct WorldRunner {
    world: World,
    commands: mpsc::Receiver<WorldCommand>,
    stats: Arc<WorldStats>,
}

impl WorldRunner {
    pub fn new(config: GameConfig) -> (Self, WorldHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let stats = Arc::new(WorldStats::default());

        let handle = WorldHandle {
            commands: tx,
            stats: stats.clone(),
        };
        let runner = Self {
            world: World::new(config),
            commands: rx,
            stats,
        };
        (runner, handle)
    }

    /// Run until every [`WorldHandle`] is dropped.
    pub async fn run(mut self) {
        let config = self.world.config().clone();
        info!(
            simulation_tps = config.simulation_tps,
            network_tps = config.network_tps,
            half_extent = config.world_half_extent,
            "World started"
        );

        let mut simulation = interval(config.simulation_interval());
        simulation.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut network = interval(config.network_interval());
        network.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.world.start(Instant::now().into_std());

        loop {
            let deadline = self.world.next_timer_deadline();

            tokio::select! {
                _ = simulation.tick() => self.simulation_step(),
                _ = network.tick() => {
                    self.world.network_tick();
                }
                _ = wait_until(deadline) => {
                    self.world.run_timers(Instant::now().into_std());
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        info!(
            ticks = self.world.tick(),
            entities = self.world.entity_count(),
            "World stopped"
        );
    }

    /// One simulation tick, timed from when the task actually woke up.
    fn simulation_step(&mut self) {
        self.world.simulation_tick(Instant::now().into_std());
        self.stats.publish(&self.world);
    }

    fn handle_command(&mut self, command: WorldCommand) {
        let now = Instant::now().into_std();
        match command {
            WorldCommand::Connect { client, respond } => {
                let session = self.world.join(client, now);
                if respond.send(session).is_err() {
                    debug!(player_id = session.player_id, "Connection gone before join completed");
                    self.world.leave(session);
                }
            }
            WorldCommand::Request {
                session,
                request_id,
                request,
            } => self.world.session_request(session, request_id, request, now),
            WorldCommand::Disconnect { session } => self.world.leave(session),
        }
        self.stats.publish(&self.world);
    }
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(at) => sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{Key, Push, ServerMsg};
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    fn config() -> GameConfig {
        GameConfig {
            seed: Some(7),
            ..GameConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_receives_id_and_state() {
        let (runner, handle) = WorldRunner::new(config());
        let task = tokio::spawn(runner.run());

        let (client, mut rx) = ClientChannel::new(64);
        let session = handle.connect(client).await;
        assert_eq!(session.map(|s| s.player_id), Some(1));

        let msg = assert_ok!(timeout(Duration::from_secs(2), rx.recv()).await);
        match msg {
            Some(ServerMsg::Push(Push::Set(batch))) => {
                assert!(batch.iter().any(|s| s.id() == 1));
            }
            other => panic!("expected a set batch, got {other:?}"),
        }

        drop(handle);
        assert_ok!(timeout(Duration::from_secs(2), task).await).unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let (runner, handle) = WorldRunner::new(config());
        tokio::spawn(runner.run());

        let (client, _rx) = ClientChannel::new(64);
        let session = handle.connect(client).await.unwrap();
        assert_eq!(handle.stats().players(), 1);

        handle.disconnect(session).await;
        let gone = timeout(Duration::from_secs(2), async {
            while handle.stats().players() != 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert_ok!(gone);
        assert_eq!(handle.stats().entities(), 0);
    }

    #[tokio::test]
    async fn test_ticks_advance() {
        let (runner, handle) = WorldRunner::new(config());
        tokio::spawn(runner.run());

        let ticking = timeout(Duration::from_secs(2), async {
            while handle.stats().ticks() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert_ok!(ticking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_step_uses_wake_time() {
        let (mut runner, _handle) = WorldRunner::new(config());
        let (mut reference, _reference_handle) = WorldRunner::new(config());
        let start = Instant::now().into_std();

        let mut sessions = Vec::new();
        for world in [&mut runner.world, &mut reference.world] {
            world.start(start);
            let (client, rx) = ClientChannel::new(64);
            let session = world.join(client, start);
            world.session_request(session, None, ClientRequest::KeyDown(Key::Up), start);
            sessions.push((session, rx));
        }
        let id = sessions[0].0.player_id;
        let spawn = runner.world.player(id).unwrap().body.position();

        // The task wakes late; elapsed time must come from the clock
        for step in 1..=2 {
            tokio::time::advance(Duration::from_millis(100)).await;
            runner.simulation_step();
            reference
                .world
                .simulation_tick(start + Duration::from_millis(100 * step));
        }

        let moved = runner.world.player(id).unwrap().body.position();
        assert_ne!(moved, spawn);
        assert_eq!(moved, reference.world.player(id).unwrap().body.position());
        assert_eq!(runner.stats.ticks(), 2);
    }
}
