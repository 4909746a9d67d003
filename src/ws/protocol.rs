//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::EntityId;

/// Keys a client can hold down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Sprint,
    Shoot,
}

/// Currently held keys. Serializes as an object listing only the held
/// keys, e.g. `{"up": true, "shoot": true}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InputState {
    #[serde(skip_serializing_if = "is_released")]
    pub up: bool,
    #[serde(skip_serializing_if = "is_released")]
    pub down: bool,
    #[serde(skip_serializing_if = "is_released")]
    pub left: bool,
    #[serde(skip_serializing_if = "is_released")]
    pub right: bool,
    #[serde(skip_serializing_if = "is_released")]
    pub sprint: bool,
    #[serde(skip_serializing_if = "is_released")]
    pub shoot: bool,
}

fn is_released(held: &bool) -> bool {
    !*held
}

impl InputState {
    pub fn set(&mut self, key: Key, held: bool) {
        let slot = match key {
            Key::Up => &mut self.up,
            Key::Down => &mut self.down,
            Key::Left => &mut self.left,
            Key::Right => &mut self.right,
            Key::Sprint => &mut self.sprint,
            Key::Shoot => &mut self.shoot,
        };
        *slot = held;
    }
}

// ============================================================================
// Client -> server
// ============================================================================

/// Raw request frame: `{"request": 7, "url": "keydown", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFrame {
    /// Correlation id echoed in the reply, if the client wants one
    #[serde(default)]
    pub request: Option<u64>,
    pub url: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct GetIdData {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct KeyData {
    key: Key,
}

/// Requests the simulation understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Ask for our entity id and register a display name
    GetId { name: String },
    KeyDown(Key),
    KeyUp(Key),
}

impl ClientRequest {
    /// Decode a request frame. Unknown topics and malformed payloads
    /// (including unknown key names) give `None`.
    pub fn from_frame(frame: &RequestFrame) -> Option<Self> {
        match frame.url.as_str() {
            "get_id" => {
                let name = if frame.data.is_null() {
                    String::new()
                } else {
                    serde_json::from_value::<GetIdData>(frame.data.clone())
                        .ok()?
                        .name
                };
                Some(Self::GetId { name })
            }
            "keydown" => key_of(&frame.data).map(Self::KeyDown),
            "keyup" => key_of(&frame.data).map(Self::KeyUp),
            _ => None,
        }
    }
}

fn key_of(data: &Value) -> Option<Key> {
    serde_json::from_value::<KeyData>(data.clone())
        .ok()
        .map(|d| d.key)
}

// ============================================================================
// Server -> client
// ============================================================================

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMsg {
    /// Answer to a request carrying a correlation id
    Reply { reply: u64, data: IdentityReply },
    /// Fire-and-forget push on a topic
    Push(Push),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "data", rename_all = "snake_case")]
pub enum Push {
    /// Batched entity states, once per network tick
    Set(Vec<EntityState>),
    /// Entity removed from the world
    Despawn(DespawnNotice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentityReply {
    pub id: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DespawnNotice {
    pub id: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Player,
    Bullet,
}

/// Rounded 2D point on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Per-entity state inside a `set` batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Player(PlayerState),
    Bullet(BulletState),
}

impl EntityState {
    pub fn id(&self) -> EntityId {
        match self {
            Self::Player(p) => p.id,
            Self::Bullet(b) => b.id,
        }
    }
}

/// Player state. The snapshot form carries `type` and `name`; the delta
/// form leaves both out.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    pub id: EntityId,
    pub pos: Point,
    pub vel: Point,
    pub rot: f32,
    pub rot_vel: f32,
    pub keys: InputState,
    pub health: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Projectile descriptor, only ever sent in snapshot form
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletState {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: EntityId,
    pub owner_id: EntityId,
    pub pos: Point,
    pub vel: Point,
}
