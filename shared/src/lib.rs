use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub type PlayerId = u32;
pub type PlanetId = u64;
pub type UnitId = u64;

/// Size of the length prefix in front of every frame body.
pub const FRAME_HEADER_LEN: usize = 4;
/// Largest body accepted on the wire.
pub const MAX_FRAME_LEN: usize = 1 << 20;
/// Hit strength of a `damage` command that does not carry `hp_count`.
pub const DEFAULT_HIT_POINTS: u32 = 1;

/// Commands sent by a client. The `name` field selects the variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ClientMessage {
    Ready {
        ready: bool,
    },
    Rendered {},
    Move {
        #[serde(deserialize_with = "lenient::id")]
        unit_id: UnitId,
        x: f64,
        y: f64,
    },
    Select {
        #[serde(deserialize_with = "lenient::ids")]
        from: Vec<PlanetId>,
        #[serde(deserialize_with = "lenient::count")]
        percentage: u32,
    },
    AddHp {
        #[serde(deserialize_with = "lenient::id")]
        planet_id: PlanetId,
        #[serde(deserialize_with = "lenient::count")]
        hp_count: u32,
    },
    Damage {
        #[serde(deserialize_with = "lenient::id")]
        planet_id: PlanetId,
        #[serde(deserialize_with = "lenient::id")]
        unit_id: UnitId,
        #[serde(
            default = "default_hit_points",
            deserialize_with = "lenient::count"
        )]
        hp_count: u32,
    },
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Ready { .. } => "ready",
            ClientMessage::Rendered {} => "rendered",
            ClientMessage::Move { .. } => "move",
            ClientMessage::Select { .. } => "select",
            ClientMessage::AddHp { .. } => "add_hp",
            ClientMessage::Damage { .. } => "damage",
        }
    }
}

fn default_hit_points() -> u32 {
    DEFAULT_HIT_POINTS
}

/// Notifications sent by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Roster snapshot, sent only to the client that just joined.
    PlayerInit {
        players: Vec<PlayerInfo>,
        id: PlayerId,
    },
    Connect {
        player: PlayerInfo,
    },
    Disconnect {
        player: PlayerInfo,
    },
    Ready {
        player: PlayerId,
        ready: bool,
    },
    #[serde(rename = "mapinit")]
    MapInit {
        map: Vec<PlanetDict>,
    },
    GameStarted {},
    Move {
        unit_id: UnitId,
        x: f64,
        y: f64,
    },
    Select {
        selected: BTreeMap<PlanetId, Vec<UnitId>>,
    },
    AddHp {
        planet_id: PlanetId,
        hp_count: u32,
    },
    Damage {
        planet_change: PlanetChange,
        unit_id: UnitId,
    },
    #[serde(rename = "gameover")]
    GameOver {
        winner: Option<PlayerId>,
    },
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::PlayerInit { .. } => "player_init",
            ServerMessage::Connect { .. } => "connect",
            ServerMessage::Disconnect { .. } => "disconnect",
            ServerMessage::Ready { .. } => "ready",
            ServerMessage::MapInit { .. } => "mapinit",
            ServerMessage::GameStarted {} => "game_started",
            ServerMessage::Move { .. } => "move",
            ServerMessage::Select { .. } => "select",
            ServerMessage::AddHp { .. } => "add_hp",
            ServerMessage::Damage { .. } => "damage",
            ServerMessage::GameOver { .. } => "gameover",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    pub ready: bool,
}

/// Planet size class. Serialized as its unit-capacity multiplier.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum PlanetKind {
    Small,
    Medium,
    Big,
    Biggest,
}

impl PlanetKind {
    pub fn multiplier(self) -> u32 {
        match self {
            PlanetKind::Small => 1,
            PlanetKind::Medium => 2,
            PlanetKind::Big => 3,
            PlanetKind::Biggest => 4,
        }
    }
}

impl From<PlanetKind> for u8 {
    fn from(kind: PlanetKind) -> u8 {
        kind.multiplier() as u8
    }
}

impl TryFrom<u8> for PlanetKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PlanetKind::Small),
            2 => Ok(PlanetKind::Medium),
            3 => Ok(PlanetKind::Big),
            4 => Ok(PlanetKind::Biggest),
            other => Err(format!("unknown planet type {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
}

impl Coords {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Coords) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Wire representation of a planet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlanetDict {
    pub id: PlanetId,
    #[serde(rename = "type")]
    pub kind: PlanetKind,
    pub owner: Option<PlayerId>,
    pub units_count: u32,
    pub coords: Coords,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlanetChange {
    pub id: PlanetId,
    pub units_count: u32,
    pub owner: Option<PlayerId>,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid frame length {0}")]
    InvalidLength(i64),
}

/// Serializes a message into `[i32 length, native order][json body]`.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(FrameError::InvalidLength(body.len() as i64));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as i32).to_ne_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, FrameError> {
    Ok(serde_json::from_slice(body)?)
}

/// Validates a length prefix. `Ok(None)` means a zero-length frame.
pub fn parse_header(header: [u8; FRAME_HEADER_LEN]) -> Result<Option<usize>, FrameError> {
    let len = i32::from_ne_bytes(header);
    if len < 0 || len as usize > MAX_FRAME_LEN {
        return Err(FrameError::InvalidLength(i64::from(len)));
    }
    if len == 0 {
        return Ok(None);
    }
    Ok(Some(len as usize))
}

/// Reads one frame body, reassembling it across as many reads as needed.
///
/// Returns `Ok(None)` when the peer closed the stream before a new frame
/// started or sent a zero-length prefix. Both mean the peer is gone.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let first = reader.read(&mut header).await?;
    if first == 0 {
        return Ok(None);
    }
    if first < FRAME_HEADER_LEN {
        reader.read_exact(&mut header[first..]).await?;
    }

    let len = match parse_header(header)? {
        Some(len) => len,
        None => return Ok(None),
    };

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Numeric fields that older clients send either as numbers or as strings.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    impl NumberOrString {
        fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
            match self {
                NumberOrString::Number(n) => Ok(n),
                NumberOrString::String(s) => s.trim().parse().map_err(E::custom),
            }
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        NumberOrString::deserialize(deserializer)?.into_u64()
    }

    pub fn ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        Vec::<NumberOrString>::deserialize(deserializer)?
            .into_iter()
            .map(NumberOrString::into_u64)
            .collect()
    }

    pub fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = NumberOrString::deserialize(deserializer)?.into_u64()?;
        u32::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ClientMessage {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_client_message_ready() {
        let msg = parse(json!({"name": "ready", "ready": true}));
        assert_eq!(msg, ClientMessage::Ready { ready: true });
        assert_eq!(msg.name(), "ready");
    }

    #[test]
    fn test_client_message_rendered_ignores_extra_fields() {
        let msg = parse(json!({"name": "rendered", "fps": 60}));
        assert_eq!(msg, ClientMessage::Rendered {});
    }

    #[test]
    fn test_client_message_damage_defaults_hit_points() {
        let msg = parse(json!({"name": "damage", "planet_id": 4, "unit_id": 17}));
        assert_eq!(
            msg,
            ClientMessage::Damage {
                planet_id: 4,
                unit_id: 17,
                hp_count: DEFAULT_HIT_POINTS,
            }
        );
    }

    #[test]
    fn test_client_message_accepts_string_ids() {
        let msg = parse(json!({"name": "select", "from": ["3", 5], "percentage": "50"}));
        assert_eq!(
            msg,
            ClientMessage::Select {
                from: vec![3, 5],
                percentage: 50,
            }
        );

        let msg = parse(json!({"name": "add_hp", "planet_id": "9", "hp_count": 2}));
        assert_eq!(
            msg,
            ClientMessage::AddHp {
                planet_id: 9,
                hp_count: 2,
            }
        );
    }

    #[test]
    fn test_client_message_rejects_unknown_name() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({"name": "teleport", "x": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_client_message_rejects_negative_hit_points() {
        let result: Result<ClientMessage, _> =
            serde_json::from_value(json!({"name": "add_hp", "planet_id": 1, "hp_count": -5}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_names_on_the_wire() {
        let cases = vec![
            (ServerMessage::MapInit { map: vec![] }, "mapinit"),
            (ServerMessage::GameOver { winner: Some(2) }, "gameover"),
            (ServerMessage::GameStarted {}, "game_started"),
            (
                ServerMessage::PlayerInit {
                    players: vec![],
                    id: 1,
                },
                "player_init",
            ),
            (
                ServerMessage::AddHp {
                    planet_id: 1,
                    hp_count: 3,
                },
                "add_hp",
            ),
        ];

        for (message, name) in cases {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["name"], name);
            assert_eq!(message.name(), name);
        }
    }

    #[test]
    fn test_planet_dict_layout() {
        let planet = PlanetDict {
            id: 7,
            kind: PlanetKind::Big,
            owner: Some(1),
            units_count: 100,
            coords: Coords::new(-120, 45),
        };

        let value = serde_json::to_value(&planet).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "type": 3,
                "owner": 1,
                "units_count": 100,
                "coords": {"x": -120, "y": 45}
            })
        );
    }

    #[test]
    fn test_select_keys_are_planet_ids() {
        let mut selected = BTreeMap::new();
        selected.insert(12, vec![40, 41]);
        let value = serde_json::to_value(ServerMessage::Select { selected }).unwrap();
        assert_eq!(value["selected"]["12"], json!([40, 41]));
    }

    #[test]
    fn test_planet_kind_multipliers() {
        assert_eq!(PlanetKind::Small.multiplier(), 1);
        assert_eq!(PlanetKind::Medium.multiplier(), 2);
        assert_eq!(PlanetKind::Big.multiplier(), 3);
        assert_eq!(PlanetKind::Biggest.multiplier(), 4);
        assert!(PlanetKind::try_from(0).is_err());
        assert_eq!(PlanetKind::try_from(4), Ok(PlanetKind::Biggest));
    }

    #[test]
    fn test_coords_distance() {
        let a = Coords::new(0, 0);
        let b = Coords::new(3, 4);
        assert_eq!(a.distance(&b), 5.0);
    }

    #[test]
    fn test_encode_frame_prefix_is_native_order() {
        let frame = encode_frame(&ClientMessage::Rendered {}).unwrap();
        let body_len = frame.len() - FRAME_HEADER_LEN;
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&frame[..FRAME_HEADER_LEN]);

        assert_eq!(i32::from_ne_bytes(header) as usize, body_len);
        let decoded: ClientMessage = decode_body(&frame[FRAME_HEADER_LEN..]).unwrap();
        assert_eq!(decoded, ClientMessage::Rendered {});
    }

    #[test]
    fn test_parse_header_rejects_negative_and_oversized() {
        assert!(matches!(
            parse_header((-1i32).to_ne_bytes()),
            Err(FrameError::InvalidLength(-1))
        ));
        assert!(parse_header(((MAX_FRAME_LEN + 1) as i32).to_ne_bytes()).is_err());
        assert_eq!(parse_header(0i32.to_ne_bytes()).unwrap(), None);
        assert_eq!(parse_header(12i32.to_ne_bytes()).unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_read_frame_reassembles_partial_reads() {
        let frame = encode_frame(&ClientMessage::Ready { ready: true }).unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame[..2])
            .read(&frame[2..7])
            .read(&frame[7..])
            .build();

        let body = read_frame(&mut reader).await.unwrap().unwrap();
        let msg: ClientMessage = decode_body(&body).unwrap();
        assert_eq!(msg, ClientMessage::Ready { ready: true });
    }

    #[tokio::test]
    async fn test_read_frame_zero_length_is_disconnect() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&0i32.to_ne_bytes())
            .build();
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_disconnect() {
        let mut reader = tokio_test::io::Builder::new().build();
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body_is_error() {
        let frame = encode_frame(&ClientMessage::Rendered {}).unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame[..frame.len() - 1])
            .build();
        assert!(matches!(
            read_frame(&mut reader).await,
            Err(FrameError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frame_then_read_back() {
        let (mut client, mut server) = tokio::io::duplex(256);
        let message = ServerMessage::Ready {
            player: 3,
            ready: false,
        };

        write_frame(&mut client, &message).await.unwrap();
        let body = read_frame(&mut server).await.unwrap().unwrap();
        let decoded: ServerMessage = decode_body(&body).unwrap();
        assert_eq!(decoded, message);
    }
}
