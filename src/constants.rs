use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001/ws";
pub const DEFAULT_EDGE: i16 = 512;
/// Identity field width in binary pixel frames: a 36-character hyphenated
/// UUID plus its NUL terminator, which puts x at byte offset 38.
pub const DEFAULT_IDENTITY_LEN: usize = 37;
pub const MAX_COLOR_ID: i16 = 16;
/// The tile-spam sweep only cycles through the first fifteen palette entries.
pub const SWEEP_COLOR_CYCLE: u32 = 15;

pub const DEFAULT_PIXEL_DELAY: (f64, f64) = (0.2, 1.0);
pub const DEFAULT_CANVAS_DELAY: (f64, f64) = (10.0, 60.0);
pub const HEAVY_PIXEL_DELAY: (f64, f64) = (0.2, 30.0);
pub const HEAVY_CANVAS_DELAY: (f64, f64) = (10.0, 120.0);
pub const HEAVY_USERS: usize = 50;
pub const HEAVY_RUN_FOR: Duration = Duration::from_secs(20);

/// Frames a session may have queued for its writer before generators wait.
pub const OUTBOUND_QUEUE_CAP: usize = 64;
/// How long shutdown waits for a writer to flush and close before aborting it.
pub const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

pub const PLACEHOLDER_MARKER: &str = "Place";

/// Leading tag byte of a binary pixel frame.
pub const POST_TILE_TAG: u8 = 4;

/// Tags for binary frames the server sends back.
pub mod reply_tags {
    pub const AUTH_SUCCESS: u8 = 0;
    pub const CANVAS: u8 = 1;
    pub const TILE_INFO: u8 = 2;
    pub const TILE_UPDATE: u8 = 3;
    pub const COLOR_LIST: u8 = 4;
    pub const USERNAME_SET: u8 = 5;
    pub const TILE_INCREMENT: u8 = 6;
    pub const LEVEL_UP: u8 = 7;
    pub const USER_COUNT: u8 = 8;
    pub const INVALID_UUID: u8 = 128;

    pub fn name(tag: u8) -> &'static str {
        match tag {
            AUTH_SUCCESS => "auth_success",
            CANVAS => "canvas",
            TILE_INFO => "tile_info",
            TILE_UPDATE => "tile_update",
            COLOR_LIST => "color_list",
            USERNAME_SET => "username_set",
            TILE_INCREMENT => "tile_increment",
            LEVEL_UP => "level_up",
            USER_COUNT => "user_count",
            INVALID_UUID => "invalid_uuid",
            _ => "unknown",
        }
    }
}
