//! Authoritative world state and the simulation/network tick bodies

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, trace};

use crate::config::GameConfig;
use crate::ws::channel::ClientChannel;
use crate::ws::protocol::{ClientRequest, EntityState};

use super::combat::{CombatSystem, MAX_HEALTH};
use super::entity::Entity;
use super::geometry::Vec2;
use super::player::{Player, Shot};
use super::projectile::Projectile;
use super::snapshot::SendMode;
use super::timers::{TimerId, TimerTask, Timers};
use super::EntityId;

/// A connection's claim on its player. Goes stale when the player is
/// despawned, even if the id is later handed to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub player_id: EntityId,
    pub token: u64,
}

/// Players appear at a random integer position within this square
const SPAWN_RANGE: i32 = 300;

/// All live entities plus the timers they own.
///
/// Every method runs to completion on the single world task; nothing here
/// is shared across threads.
pub struct World {
    config: GameConfig,
    entities: BTreeMap<EntityId, Entity>,
    /// Ids in `entities` that are players with a client channel
    players: BTreeSet<EntityId>,
    next_id: EntityId,
    timers: Timers,
    /// Armed full-state broadcast, at most one at a time
    broadcast: Option<TimerId>,
    next_session: u64,
    rng: ChaCha8Rng,
    last_tick: Option<Instant>,
    tick: u64,
}

impl World {
    pub fn new(config: GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            next_id: config.id_floor,
            config,
            entities: BTreeMap::new(),
            players: BTreeSet::new(),
            timers: Timers::new(),
            broadcast: None,
            next_session: 1,
            rng,
            last_tick: None,
            tick: 0,
        }
    }

    /// Anchor the tick clock; the first simulation tick measures from here.
    pub fn start(&mut self, now: Instant) {
        self.last_tick = Some(now);
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    #[cfg(test)]
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.entities.get(&id).and_then(Entity::as_player)
    }

    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.entities.get_mut(&id).and_then(Entity::as_player_mut)
    }

    #[cfg(test)]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_timer_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Next free id, wrapping from the ceiling back to the floor and
    /// skipping ids that are still live.
    fn allocate_id(&mut self) -> EntityId {
        let (floor, ceiling) = (self.config.id_floor, self.config.id_ceiling);
        let span = u64::from(ceiling - floor) + 1;
        for _ in 0..span {
            let id = self.next_id;
            self.next_id = if id >= ceiling { floor } else { id + 1 };
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
        panic!(
            "entity id space {floor}..={ceiling} exhausted with {} live entities",
            self.entities.len()
        );
    }

    /// Register a new entity under a fresh id, arm the timers its kind
    /// owns, and queue its snapshot for every player.
    pub fn spawn(&mut self, build: impl FnOnce(EntityId) -> Entity, now: Instant) -> EntityId {
        let id = self.allocate_id();
        let mut entity = build(id);
        debug_assert_eq!(entity.id(), id, "entity built with a foreign id");

        match &mut entity {
            Entity::Projectile(p) => {
                let at = now + self.config.projectile_lifetime;
                p.expiry = Some(self.timers.schedule(at, TimerTask::ExpireProjectile(id)));
            }
            Entity::Player(p) => {
                let at = now + self.config.regen_interval;
                p.regen = Some(self.timers.schedule(at, TimerTask::RegenHealth(id)));
                self.players.insert(id);
            }
        }

        let snapshot = entity.send(SendMode::Snapshot);
        self.entities.insert(id, entity);
        if let Some(state) = snapshot {
            self.enqueue_all(&[state]);
        }
        id
    }

    /// Create a player bound to `client` at a random spawn point.
    pub fn new_player(&mut self, client: ClientChannel, now: Instant) -> EntityId {
        let position = Vec2::new(
            self.rng.gen_range(-SPAWN_RANGE..=SPAWN_RANGE) as f32,
            self.rng.gen_range(-SPAWN_RANGE..=SPAWN_RANGE) as f32,
        );
        let stats = self.config.player;
        let id = self.spawn(move |id| Player::new(id, position, client, stats).into(), now);
        info!(
            player_id = id,
            x = position.x,
            y = position.y,
            players = self.players.len(),
            "Player spawned"
        );
        id
    }

    /// Spawn a player for a new connection and tag it with a fresh session.
    pub fn join(&mut self, client: ClientChannel, now: Instant) -> Session {
        let player_id = self.new_player(client, now);
        let token = self.next_session;
        self.next_session += 1;
        if let Some(player) = self.player_mut(player_id) {
            player.session = token;
        }
        Session { player_id, token }
    }

    /// Whether `session` still names the player it was issued for
    pub fn is_current(&self, session: Session) -> bool {
        self.entities
            .get(&session.player_id)
            .and_then(Entity::as_player)
            .is_some_and(|p| p.session == session.token)
    }

    pub fn spawn_projectile(&mut self, owner_id: EntityId, shot: Shot, now: Instant) -> EntityId {
        self.spawn(
            move |id| Projectile::new(id, owner_id, shot.position, shot.velocity).into(),
            now,
        )
    }

    /// Remove an entity from both registries, cancel its timers, and tell
    /// every remaining player. Unknown ids are a no-op.
    pub fn despawn(&mut self, id: EntityId) -> bool {
        let Some(entity) = self.entities.remove(&id) else {
            return false;
        };
        self.players.remove(&id);

        for timer in entity.owned_timers() {
            self.timers.cancel(timer);
        }

        for player_id in &self.players {
            if let Some(player) = self.entities.get(player_id).and_then(Entity::as_player) {
                player.client.push_despawn(id);
            }
        }

        debug!(entity_id = id, kind = entity.kind(), "Entity despawned");
        true
    }

    // ------------------------------------------------------------------
    // Client input
    // ------------------------------------------------------------------

    /// Apply one decoded client request. Requests for ids that are gone
    /// (or are not players) are dropped.
    pub fn handle_request(
        &mut self,
        player_id: EntityId,
        request_id: Option<u64>,
        request: ClientRequest,
        now: Instant,
    ) {
        let Some(player) = self.player_mut(player_id) else {
            debug!(player_id, "Request for unknown player ignored");
            return;
        };

        match request {
            ClientRequest::GetId { name } => {
                if let Some(request_id) = request_id {
                    player.client.reply(request_id, player_id);
                }
                info!(player_id, name = %name, "Player identified");
                player.name = name;
                if self.broadcast.is_none() {
                    let at = now + self.config.snapshot_delay;
                    self.broadcast = Some(self.timers.schedule(at, TimerTask::BroadcastSnapshot));
                }
            }
            ClientRequest::KeyDown(key) => player.set_key(key, true),
            ClientRequest::KeyUp(key) => player.set_key(key, false),
        }
    }

    /// [`World::handle_request`] for a connection; stale sessions are dropped.
    pub fn session_request(
        &mut self,
        session: Session,
        request_id: Option<u64>,
        request: ClientRequest,
        now: Instant,
    ) {
        if !self.is_current(session) {
            debug!(player_id = session.player_id, "Request from stale session ignored");
            return;
        }
        self.handle_request(session.player_id, request_id, request, now);
    }

    /// Connection closed. Only the session's own player leaves.
    pub fn leave(&mut self, session: Session) {
        if self.is_current(session) {
            self.disconnect(session.player_id);
        }
    }

    /// Connection closed: the player leaves the world.
    pub fn disconnect(&mut self, player_id: EntityId) {
        if self.despawn(player_id) {
            info!(player_id, players = self.players.len(), "Player left");
        }
    }

    // ------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------

    /// Advance physics by the wall-clock time since the previous tick,
    /// wrap positions, then run each entity's behaviour.
    pub fn simulation_tick(&mut self, now: Instant) {
        let dt = match self.last_tick {
            Some(prev) => now
                .saturating_duration_since(prev)
                .min(self.config.max_tick_delta)
                .as_secs_f32(),
            None => 0.0,
        };
        self.last_tick = Some(now);
        self.tick += 1;

        let half_extent = self.config.world_half_extent;
        for entity in self.entities.values_mut() {
            entity.integrate(dt);
            entity.wrap(half_extent);
        }

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.update_entity(id, now);
        }
    }

    fn update_entity(&mut self, id: EntityId, now: Instant) {
        let weapon = self.config.weapon;
        let Some(entity) = self.entities.get_mut(&id) else {
            // Removed earlier in this tick
            return;
        };

        if let Some(shot) = entity.update(&weapon) {
            let projectile_id = self.spawn_projectile(id, shot, now);
            let at = now + self.config.fire_cooldown;
            let rearm = self.timers.schedule(at, TimerTask::RearmWeapon(id));
            if let Some(player) = self.player_mut(id) {
                player.cooldown = Some(rearm);
            }
            debug!(player_id = id, projectile_id, "Projectile fired");
        }

        if self.players.contains(&id) {
            self.resolve_hits(id);
        }
    }

    /// Test every foreign projectile against the player's bounds. Each hit
    /// costs health and consumes the projectile; the player is despawned
    /// once health runs out.
    fn resolve_hits(&mut self, player_id: EntityId) {
        let Some(entity) = self.entities.get_mut(&player_id) else {
            return;
        };
        let bounds = entity.bounding_rect();

        let hits: Vec<EntityId> = self
            .entities
            .values()
            .filter_map(Entity::as_projectile)
            .filter(|p| CombatSystem::is_hit(player_id, &bounds, p.owner_id, &p.swept_rect()))
            .map(|p| p.body.id)
            .collect();

        let damage = self.config.weapon.damage;
        for projectile_id in hits {
            let Some(player) = self.player_mut(player_id) else {
                break;
            };
            let (health, dead) = CombatSystem::apply_damage(player.health, damage);
            player.health = health;
            self.despawn(projectile_id);

            if dead {
                info!(player_id, projectile_id, "Player killed");
                self.despawn(player_id);
                break;
            }
        }
    }

    /// Append every entity's delta to each player's queue and flush each
    /// queue as a single `set` batch. Players whose connection is gone are
    /// despawned instead.
    pub fn network_tick(&mut self) {
        let deltas: Vec<EntityState> = self
            .entities
            .values()
            .filter_map(|e| e.send(SendMode::Delta))
            .collect();

        let mut closed = Vec::new();
        let mut sent = 0;
        for player_id in &self.players {
            let Some(player) = self
                .entities
                .get_mut(player_id)
                .and_then(Entity::as_player_mut)
            else {
                continue;
            };
            if player.client.is_closed() {
                closed.push(*player_id);
                continue;
            }
            player.outbound.extend_from_slice(&deltas);
            sent += player.outbound.flush(&player.client);
        }
        trace!(players = self.players.len(), states = sent, "State flushed");

        for player_id in closed {
            self.disconnect(player_id);
        }
    }

    /// Run every timer due at `now`.
    pub fn run_timers(&mut self, now: Instant) {
        while let Some(task) = self.timers.pop_due(now) {
            match task {
                TimerTask::ExpireProjectile(id) => {
                    self.despawn(id);
                }
                TimerTask::RearmWeapon(id) => {
                    if let Some(player) = self.player_mut(id) {
                        player.can_fire = true;
                        player.cooldown = None;
                    }
                }
                TimerTask::RegenHealth(id) => {
                    if !self.players.contains(&id) {
                        continue;
                    }
                    let at = now + self.config.regen_interval;
                    let next = self.timers.schedule(at, TimerTask::RegenHealth(id));
                    if let Some(player) = self.player_mut(id) {
                        if player.health < MAX_HEALTH {
                            player.health = CombatSystem::regenerate(player.health);
                        }
                        player.regen = Some(next);
                    }
                }
                TimerTask::BroadcastSnapshot => {
                    self.broadcast = None;
                    let snapshots: Vec<EntityState> = self
                        .entities
                        .values()
                        .filter_map(|e| e.send(SendMode::Snapshot))
                        .collect();
                    self.enqueue_all(&snapshots);
                }
            }
        }
    }

    fn enqueue_all(&mut self, states: &[EntityState]) {
        for player_id in &self.players {
            if let Some(player) = self
                .entities
                .get_mut(player_id)
                .and_then(Entity::as_player_mut)
            {
                player.outbound.extend_from_slice(states);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::{Key, Push, ServerMsg};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_config() -> GameConfig {
        GameConfig {
            seed: Some(42),
            ..GameConfig::default()
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn connect(world: &mut World, now: Instant) -> (EntityId, mpsc::Receiver<ServerMsg>) {
        let (client, rx) = ClientChannel::new(256);
        let id = world.new_player(client, now);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn despawned(msgs: &[ServerMsg]) -> Vec<EntityId> {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMsg::Push(Push::Despawn(n)) => Some(n.id),
                _ => None,
            })
            .collect()
    }

    fn sets(msgs: &[ServerMsg]) -> Vec<Vec<EntityState>> {
        msgs.iter()
            .filter_map(|m| match m {
                ServerMsg::Push(Push::Set(batch)) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    fn place(world: &mut World, id: EntityId, x: f32, y: f32) {
        let player = world.player_mut(id).unwrap();
        player.body.set_position(Vec2::new(x, y));
    }

    fn bullet_at(world: &mut World, owner: EntityId, x: f32, y: f32, now: Instant) -> EntityId {
        let shot = Shot {
            position: Vec2::new(x, y),
            velocity: Vec2::ZERO,
        };
        world.spawn_projectile(owner, shot, now)
    }

    #[test]
    fn test_new_player_registers_in_both_maps() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (id, _rx) = connect(&mut world, now);

        assert_eq!(id, 1);
        assert!(world.contains(id));
        assert_eq!(world.player_count(), 1);
        let p = world.player(id).unwrap().body.position();
        assert!(p.x.abs() <= 300.0 && p.y.abs() <= 300.0);
        // Regen timer armed
        assert_eq!(world.pending_timers(), 1);
    }

    #[test]
    fn test_despawn_is_idempotent() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx_a) = connect(&mut world, now);
        let (b, mut rx_b) = connect(&mut world, now);
        drain(&mut rx_b);

        assert!(world.despawn(a));
        assert!(!world.despawn(a));

        assert!(!world.contains(a));
        assert!(world.player(a).is_none());
        assert_eq!(world.player_count(), 1);
        assert!(world.contains(b));
        assert_eq!(despawned(&drain(&mut rx_b)), vec![a]);
    }

    #[test]
    fn test_despawn_cancels_owned_timers() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);
        let bullet = bullet_at(&mut world, a, 0.0, 0.0, now);
        assert_eq!(world.pending_timers(), 2);

        world.despawn(bullet);
        assert_eq!(world.pending_timers(), 1);
        world.despawn(a);
        assert_eq!(world.pending_timers(), 0);
    }

    #[test]
    fn test_id_wraps_and_skips_live_ids() {
        let now = Instant::now();
        let mut world = World::new(GameConfig {
            id_ceiling: 3,
            ..test_config()
        });
        let ids: Vec<EntityId> = (0..3).map(|_| bullet_at(&mut world, 0, 0.0, 0.0, now)).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        world.despawn(2);
        assert_eq!(bullet_at(&mut world, 0, 0.0, 0.0, now), 2);

        world.despawn(1);
        world.despawn(3);
        assert_eq!(bullet_at(&mut world, 0, 0.0, 0.0, now), 3);
        assert_eq!(bullet_at(&mut world, 0, 0.0, 0.0, now), 1);
    }

    #[test]
    fn test_id_allocation_never_collides() {
        let now = Instant::now();
        let mut world = World::new(GameConfig {
            id_ceiling: 64,
            ..test_config()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut live: BTreeSet<EntityId> = BTreeSet::new();

        for _ in 0..500 {
            let burst = rng.gen_range(0..8);
            for _ in 0..burst {
                if live.len() >= 48 {
                    break;
                }
                let id = bullet_at(&mut world, 0, 0.0, 0.0, now);
                assert!(live.insert(id), "id {id} handed out while live");
            }

            let victims: Vec<EntityId> =
                live.iter().copied().filter(|_| rng.gen_bool(0.3)).collect();
            for id in victims {
                assert!(world.despawn(id));
                live.remove(&id);
            }
            assert_eq!(world.entity_count(), live.len());
        }
    }

    #[test]
    fn test_projectile_hits_drain_health_then_kill() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (victim, _rx_v) = connect(&mut world, now);
        let (shooter, mut rx_s) = connect(&mut world, now);
        place(&mut world, victim, 0.0, 0.0);
        place(&mut world, shooter, 0.0, 500.0);
        world.start(now);

        for hit in 1..=3 {
            let bullet = bullet_at(&mut world, shooter, 0.0, 0.0, now);
            world.simulation_tick(now);
            assert!(!world.contains(bullet), "hit {hit} should consume the projectile");
        }
        assert_eq!(world.player(victim).unwrap().health, 40);
        drain(&mut rx_s);

        for _ in 0..2 {
            bullet_at(&mut world, shooter, 0.0, 0.0, now);
            world.simulation_tick(now);
        }

        assert!(!world.contains(victim));
        assert_eq!(world.player_count(), 1);
        let notices = despawned(&drain(&mut rx_s));
        assert_eq!(notices.iter().filter(|&&id| id == victim).count(), 1);
    }

    #[test]
    fn test_own_projectile_does_no_damage() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);
        place(&mut world, a, 0.0, 0.0);
        let bullet = bullet_at(&mut world, a, 0.0, 0.0, now);

        world.simulation_tick(now);
        assert!(world.contains(bullet));
        assert_eq!(world.player(a).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_fast_projectile_cannot_tunnel() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (victim, _rx_v) = connect(&mut world, now);
        let (shooter, _rx_s) = connect(&mut world, now);
        place(&mut world, victim, 0.0, 0.0);
        place(&mut world, shooter, 0.0, 500.0);

        // Starts below the victim and crosses it entirely within one tick
        let shot = Shot {
            position: Vec2::new(0.0, 100.0),
            velocity: Vec2::new(0.0, -2000.0),
        };
        let bullet = world.spawn_projectile(shooter, shot, now);
        world.start(now);
        world.simulation_tick(now + ms(100));

        assert!(!world.contains(bullet));
        assert_eq!(world.player(victim).unwrap().health, 80);
    }

    #[test]
    fn test_shot_does_not_hit_player_behind_shooter() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (shooter, _rx_s) = connect(&mut world, now);
        let (victim, _rx_v) = connect(&mut world, now);
        place(&mut world, shooter, 0.0, 0.0);
        place(&mut world, victim, 0.0, 61.0);

        world.handle_request(shooter, None, ClientRequest::KeyDown(Key::Shoot), now);
        world.start(now);
        world.simulation_tick(now + ms(100));
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.player(victim).unwrap().health, MAX_HEALTH);

        world.simulation_tick(now + ms(200));
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.player(victim).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_fire_cooldown() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);
        world.handle_request(a, None, ClientRequest::KeyDown(Key::Shoot), now);
        world.start(now);

        world.simulation_tick(now + ms(10));
        assert_eq!(world.entity_count(), 2);
        assert!(!world.player(a).unwrap().can_fire);

        // Still cooling down: holding shoot does nothing
        world.simulation_tick(now + ms(30));
        assert_eq!(world.entity_count(), 2);

        world.run_timers(now + ms(60));
        assert!(world.player(a).unwrap().can_fire);

        world.simulation_tick(now + ms(70));
        assert_eq!(world.entity_count(), 3);
        assert!(!world.player(a).unwrap().can_fire);
    }

    #[test]
    fn test_projectile_expires() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, mut rx) = connect(&mut world, now);
        let bullet = bullet_at(&mut world, a, 1000.0, 1000.0, now);

        world.run_timers(now + ms(1999));
        assert!(world.contains(bullet));
        world.run_timers(now + ms(2000));
        assert!(!world.contains(bullet));
        assert_eq!(despawned(&drain(&mut rx)), vec![bullet]);
    }

    #[test]
    fn test_world_wraps_toroidally() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let half = world.config().world_half_extent;
        let (a, _rx) = connect(&mut world, now);
        place(&mut world, a, half, 0.0);
        world.start(now);

        world.simulation_tick(now + ms(33));
        assert_eq!(world.player(a).unwrap().body.position().x, half);

        place(&mut world, a, half - 1.0, 0.0);
        world.player_mut(a).unwrap().body.apply_impulse(100.0, 0.0);
        world.simulation_tick(now + ms(133));
        assert_eq!(world.player(a).unwrap().body.position().x, -half);
    }

    #[test]
    fn test_tick_delta_is_clamped() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);
        place(&mut world, a, 0.0, 0.0);
        world.player_mut(a).unwrap().body.apply_impulse(100.0, 0.0);
        world.start(now);

        world.simulation_tick(now + Duration::from_secs(10));
        let x = world.player(a).unwrap().body.position().x;
        assert!((x - 25.0).abs() < 1e-3, "moved {x}");
    }

    #[test]
    fn test_network_tick_sends_one_batch_per_player() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, mut rx_a) = connect(&mut world, now);
        let (b, mut rx_b) = connect(&mut world, now);
        bullet_at(&mut world, a, 5000.0, 5000.0, now);
        world.network_tick();
        drain(&mut rx_a);
        drain(&mut rx_b);

        world.start(now);
        for step in 1..=3 {
            world.simulation_tick(now + ms(33 * step));
        }
        world.network_tick();

        for rx in [&mut rx_a, &mut rx_b] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 1);
            let batches = sets(&msgs);
            let ids: Vec<EntityId> = batches[0].iter().map(EntityState::id).collect();
            assert_eq!(ids, vec![a, b]);
            for state in &batches[0] {
                match state {
                    EntityState::Player(p) => {
                        assert!(p.kind.is_none());
                        assert!(p.name.is_none());
                    }
                    other => panic!("bullets are snapshot-only, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_spawn_snapshot_reaches_existing_players() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, mut rx_a) = connect(&mut world, now);
        world.network_tick();
        drain(&mut rx_a);

        let (b, _rx_b) = connect(&mut world, now);
        let bullet = bullet_at(&mut world, b, 0.0, 0.0, now);
        world.network_tick();

        let batches = sets(&drain(&mut rx_a));
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert!(batch.iter().any(|s| matches!(s,
            EntityState::Player(p) if p.id == b && p.kind.is_some())));
        assert!(batch.iter().any(|s| matches!(s,
            EntityState::Bullet(bs) if bs.id == bullet && bs.owner_id == b)));
        assert!(batch.iter().any(|s| s.id() == a));
    }

    #[test]
    fn test_get_id_replies_and_broadcasts_names() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, mut rx_a) = connect(&mut world, now);
        let (b, mut rx_b) = connect(&mut world, now);
        world.network_tick();
        drain(&mut rx_a);
        drain(&mut rx_b);

        let request = ClientRequest::GetId {
            name: "ada".to_string(),
        };
        world.handle_request(a, Some(7), request, now);
        assert_eq!(world.player(a).unwrap().name, "ada");

        let msgs = drain(&mut rx_a);
        assert!(matches!(
            msgs.as_slice(),
            [ServerMsg::Reply { reply: 7, data }] if data.id == a
        ));

        world.run_timers(now + ms(100));
        world.network_tick();
        let batch = sets(&drain(&mut rx_b)).remove(0);
        let named = batch.iter().any(|s| {
            matches!(s, EntityState::Player(p)
                if p.id == a && p.name.as_deref() == Some("ada") && p.kind.is_some())
        });
        assert!(named);
        assert!(batch.iter().any(|s| s.id() == b));
    }

    #[test]
    fn test_repeated_get_id_broadcasts_once() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, mut rx_a) = connect(&mut world, now);
        world.network_tick();
        drain(&mut rx_a);
        assert_eq!(world.pending_timers(), 1);

        for name in ["ada", "grace"] {
            let request = ClientRequest::GetId {
                name: name.to_string(),
            };
            world.handle_request(a, None, request, now);
        }
        assert_eq!(world.pending_timers(), 2);

        world.run_timers(now + ms(100));
        world.network_tick();
        let batch = sets(&drain(&mut rx_a)).remove(0);
        let snapshots: Vec<_> = batch
            .iter()
            .filter(|s| matches!(s, EntityState::Player(p) if p.id == a && p.kind.is_some()))
            .collect();
        assert_eq!(snapshots.len(), 1);

        let request = ClientRequest::GetId {
            name: "ada".to_string(),
        };
        world.handle_request(a, None, request, now + ms(100));
        assert_eq!(world.pending_timers(), 2);
    }

    #[test]
    fn test_stale_session_cannot_touch_reused_id() {
        let now = Instant::now();
        let mut world = World::new(GameConfig {
            id_ceiling: 1,
            ..test_config()
        });
        let (client, _rx_a) = ClientChannel::new(16);
        let first = world.join(client, now);
        assert!(world.is_current(first));
        world.despawn(first.player_id);

        let (client, _rx_b) = ClientChannel::new(16);
        let second = world.join(client, now);
        assert_eq!(second.player_id, first.player_id);
        assert_ne!(second, first);
        assert!(!world.is_current(first));

        world.session_request(first, None, ClientRequest::KeyDown(Key::Up), now);
        assert!(!world.player(second.player_id).unwrap().input.up);
        world.leave(first);
        assert_eq!(world.player_count(), 1);

        world.session_request(second, None, ClientRequest::KeyDown(Key::Up), now);
        assert!(world.player(second.player_id).unwrap().input.up);
        world.leave(second);
        assert_eq!(world.player_count(), 0);
    }

    #[test]
    fn test_key_events_and_stale_requests() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);

        world.handle_request(a, None, ClientRequest::KeyDown(Key::Up), now);
        world.handle_request(a, None, ClientRequest::KeyDown(Key::Left), now);
        world.handle_request(a, None, ClientRequest::KeyUp(Key::Up), now);
        let input = world.player(a).unwrap().input;
        assert!(!input.up);
        assert!(input.left);

        world.handle_request(999, Some(1), ClientRequest::KeyDown(Key::Up), now);
        world.disconnect(a);
        world.handle_request(a, None, ClientRequest::KeyDown(Key::Up), now);
        world.disconnect(a);
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn test_health_regenerates_until_full() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, _rx) = connect(&mut world, now);
        world.player_mut(a).unwrap().health = 98;

        world.run_timers(now + ms(200));
        assert_eq!(world.player(a).unwrap().health, 99);
        world.run_timers(now + ms(400));
        world.run_timers(now + ms(600));
        world.run_timers(now + ms(800));
        assert_eq!(world.player(a).unwrap().health, MAX_HEALTH);
        assert_eq!(world.pending_timers(), 1);
    }

    #[test]
    fn test_closed_connection_is_despawned_on_flush() {
        let now = Instant::now();
        let mut world = World::new(test_config());
        let (a, rx_a) = connect(&mut world, now);
        let (_b, mut rx_b) = connect(&mut world, now);
        drop(rx_a);

        world.network_tick();
        assert!(!world.contains(a));
        assert_eq!(despawned(&drain(&mut rx_b)), vec![a]);
    }
}
