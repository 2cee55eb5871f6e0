//! JSON control-plane messages.
//!
//! Requests are objects discriminated by `requestType`. Replies are objects
//! discriminated by `rt`, though the canvas server names that field
//! `responseType` and wraps the object in a one-element array; both shapes
//! are accepted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{ClientError, Result},
    identity::UserIdentity,
    protocol::PixelUpdate,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requestType")]
pub enum Request {
    #[serde(rename = "initialAuth")]
    InitialAuth,
    #[serde(rename = "auth")]
    Auth {
        #[serde(rename = "userID")]
        user_id: UserIdentity,
    },
    #[serde(rename = "postTile")]
    PostTile {
        #[serde(rename = "userID")]
        user_id: UserIdentity,
        #[serde(rename = "X")]
        x: i16,
        #[serde(rename = "Y")]
        y: i16,
        #[serde(rename = "colorID", with = "color_id")]
        color_id: i16,
    },
    #[serde(rename = "getCanvas")]
    GetCanvas {
        #[serde(rename = "userID")]
        user_id: UserIdentity,
    },
    #[serde(rename = "admin_cmd")]
    AdminCmd {
        #[serde(rename = "userID")]
        user_id: UserIdentity,
        cmd: AdminAction,
    },
}

impl Request {
    pub fn post_tile(user_id: UserIdentity, update: &PixelUpdate) -> Self {
        Request::PostTile {
            user_id,
            x: update.x,
            y: update.y,
            color_id: update.color_id,
        }
    }

    pub fn pixel_update(&self) -> Option<PixelUpdate> {
        match self {
            Request::PostTile { x, y, color_id, .. } => Some(PixelUpdate {
                x: *x,
                y: *y,
                color_id: *color_id,
            }),
            _ => None,
        }
    }

    pub fn request_type(&self) -> &'static str {
        match self {
            Request::InitialAuth => "initialAuth",
            Request::Auth { .. } => "auth",
            Request::PostTile { .. } => "postTile",
            Request::GetCanvas { .. } => "getCanvas",
            Request::AdminCmd { .. } => "admin_cmd",
        }
    }
}

/// The `cmd` object of an `admin_cmd` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    Message {
        message: String,
    },
    /// The server reads the target identity from the `message` field.
    ToggleShadowban {
        #[serde(rename = "message")]
        target: UserIdentity,
    },
    Shutdown,
}

impl AdminAction {
    pub fn name(&self) -> &'static str {
        match self {
            AdminAction::Message { .. } => "message",
            AdminAction::ToggleShadowban { .. } => "toggle_shadowban",
            AdminAction::Shutdown => "shutdown",
        }
    }
}

/// The server only accepts `colorID` as a decimal string.
mod color_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &i16, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i16, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i16),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}

pub fn encode_json(request: &Request) -> String {
    // Every field is a string or an integer, so serialization cannot fail.
    serde_json::to_string(request).unwrap_or_default()
}

pub fn decode_json(text: &str) -> Result<Request> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    AuthSuccessful,
    ReAuthSuccessful,
    TileUpdate,
    FullCanvas,
    ColorList,
    Error,
    Kicked,
    Disconnecting,
    Announcement,
    UserCount,
    LevelUp,
    Other(String),
}

impl ReplyKind {
    fn parse(rt: &str) -> Self {
        match rt {
            "authSuccessful" => ReplyKind::AuthSuccessful,
            "reAuthSuccessful" => ReplyKind::ReAuthSuccessful,
            "tileUpdate" => ReplyKind::TileUpdate,
            "fullCanvas" => ReplyKind::FullCanvas,
            "colorList" => ReplyKind::ColorList,
            "error" => ReplyKind::Error,
            "kicked" => ReplyKind::Kicked,
            "disconnecting" => ReplyKind::Disconnecting,
            "announcement" => ReplyKind::Announcement,
            "userCount" => ReplyKind::UserCount,
            "levelUp" => ReplyKind::LevelUp,
            other => ReplyKind::Other(other.to_string()),
        }
    }
}

/// A decoded server reply: its discriminator plus the remaining fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub rt: String,
    pub fields: Map<String, Value>,
}

impl Reply {
    pub fn uuid(&self) -> Option<&str> {
        self.fields.get("uuid").and_then(Value::as_str)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.fields
            .get("errorMessage")
            .or_else(|| self.fields.get("msg"))
            .and_then(Value::as_str)
    }

    /// True for replies after which the server drops the connection.
    pub fn ends_session(&self) -> bool {
        matches!(self.kind, ReplyKind::Kicked | ReplyKind::Disconnecting)
    }
}

pub fn decode_reply(text: &str) -> Result<Reply> {
    let value: Value = serde_json::from_str(text)?;
    let object = match value {
        Value::Object(map) => map,
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(ClientError::MalformedMessage(
                    "reply array does not start with an object".to_string(),
                ));
            }
        },
        other => {
            return Err(ClientError::MalformedMessage(format!(
                "reply is neither an object nor an array: {other}"
            )));
        }
    };

    let mut fields = object;
    let rt = match fields.remove("rt").or_else(|| fields.remove("responseType")) {
        Some(Value::String(rt)) => rt,
        Some(other) => {
            return Err(ClientError::MalformedMessage(format!(
                "reply discriminator is not a string: {other}"
            )));
        }
        None => {
            return Err(ClientError::MalformedMessage(
                "reply has no rt field".to_string(),
            ));
        }
    };

    Ok(Reply {
        kind: ReplyKind::parse(&rt),
        rt,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(raw: &str) -> UserIdentity {
        UserIdentity::new(raw).unwrap()
    }

    #[test]
    fn post_tile_matches_server_field_names() {
        let update = PixelUpdate {
            x: 10,
            y: 20,
            color_id: 3,
        };
        let text = encode_json(&Request::post_tile(id("abc-123"), &update));
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(
            value,
            json!({"requestType": "postTile", "userID": "abc-123", "X": 10, "Y": 20, "colorID": "3"})
        );

        let decoded = decode_json(&text).unwrap();
        assert_eq!(decoded.pixel_update(), Some(update));
        assert_eq!(decoded.request_type(), "postTile");
    }

    #[test]
    fn every_valid_pixel_survives_post_tile() {
        use crate::constants::{DEFAULT_EDGE, MAX_COLOR_ID};
        use crate::utils::random_pixel;
        use rand::{SeedableRng, rngs::StdRng};

        let edge = DEFAULT_EDGE;
        let user = id("0F8FAD5B-D9CB-469F-A165-70867728950E");
        let corners = [0, 1, edge - 1, edge];
        let colors = [0, 1, MAX_COLOR_ID - 1, MAX_COLOR_ID];
        let mut updates = Vec::new();
        for x in corners {
            for y in corners {
                for color_id in colors {
                    updates.push(PixelUpdate { x, y, color_id });
                }
            }
        }
        let mut rng = StdRng::seed_from_u64(0x5eed);
        updates.extend((0..2_000).map(|_| random_pixel(&mut rng, edge, 0)));

        for update in updates {
            let request = Request::post_tile(user.clone(), &update);
            let decoded = decode_json(&encode_json(&request)).unwrap();
            assert_eq!(decoded.pixel_update(), Some(update));
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn color_id_decodes_from_number_too() {
        let request =
            decode_json(r#"{"requestType":"postTile","userID":"u","X":1,"Y":2,"colorID":16}"#)
                .unwrap();
        assert_eq!(
            request.pixel_update(),
            Some(PixelUpdate {
                x: 1,
                y: 2,
                color_id: 16
            })
        );
    }

    #[test]
    fn initial_auth_and_queries() {
        assert_eq!(
            encode_json(&Request::InitialAuth),
            r#"{"requestType":"initialAuth"}"#
        );

        let canvas = Request::GetCanvas {
            user_id: id("abc-123"),
        };
        let text = encode_json(&canvas);
        assert_eq!(text, r#"{"requestType":"getCanvas","userID":"abc-123"}"#);
        assert_eq!(decode_json(&text).unwrap(), canvas);
    }

    #[test]
    fn admin_commands_have_the_tool_payload_shape() {
        let shutdown = Request::AdminCmd {
            user_id: id("admin"),
            cmd: AdminAction::Shutdown,
        };
        let value: Value = serde_json::from_str(&encode_json(&shutdown)).unwrap();
        assert_eq!(
            value,
            json!({"requestType": "admin_cmd", "userID": "admin", "cmd": {"action": "shutdown"}})
        );

        let ban = Request::AdminCmd {
            user_id: id("admin"),
            cmd: AdminAction::ToggleShadowban {
                target: id("victim"),
            },
        };
        let value: Value = serde_json::from_str(&encode_json(&ban)).unwrap();
        assert_eq!(
            value["cmd"],
            json!({"action": "toggle_shadowban", "message": "victim"})
        );
        assert_eq!(decode_json(&encode_json(&ban)).unwrap(), ban);
    }

    #[test]
    fn decode_rejects_bad_syntax_and_missing_discriminator() {
        assert!(matches!(
            decode_json("{not json"),
            Err(ClientError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_json(r#"{"userID":"abc"}"#),
            Err(ClientError::MalformedMessage(_))
        ));
        assert!(matches!(
            decode_json(r#"{"requestType":"dance"}"#),
            Err(ClientError::MalformedMessage(_))
        ));
    }

    #[test]
    fn auth_reply_in_either_shape() {
        let bare = decode_reply(r#"{"rt": "authSuccessful", "uuid": "abc-123"}"#).unwrap();
        assert_eq!(bare.kind, ReplyKind::AuthSuccessful);
        assert_eq!(bare.uuid(), Some("abc-123"));

        let wrapped = decode_reply(
            r#"[{"responseType":"authSuccessful","uuid":"ABC-123","remainingTiles":60}]"#,
        )
        .unwrap();
        assert_eq!(wrapped.kind, ReplyKind::AuthSuccessful);
        assert_eq!(wrapped.uuid(), Some("ABC-123"));
        assert_eq!(wrapped.fields["remainingTiles"], json!(60));
    }

    #[test]
    fn reply_errors_and_unknown_kinds() {
        let err = decode_reply(r#"{"responseType":"error","errorMessage":"Invalid X coordinate"}"#)
            .unwrap();
        assert_eq!(err.kind, ReplyKind::Error);
        assert_eq!(err.error_message(), Some("Invalid X coordinate"));

        let other = decode_reply(r#"{"rt":"ti","un":"someone"}"#).unwrap();
        assert_eq!(other.kind, ReplyKind::Other("ti".to_string()));

        assert!(decode_reply(r#"{"uuid":"abc"}"#).is_err());
        assert!(decode_reply("[]").is_err());
        assert!(decode_reply("42").is_err());
        assert!(decode_reply(r#"{"rt":"kicked"}"#).unwrap().ends_session());
    }
}
