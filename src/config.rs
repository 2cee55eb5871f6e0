use std::{fmt, str::FromStr, time::Duration};

use clap::{Parser, ValueEnum};
use url::Url;

use crate::{
    constants::{
        DEFAULT_CANVAS_DELAY, DEFAULT_EDGE, DEFAULT_ENDPOINT, DEFAULT_IDENTITY_LEN,
        DEFAULT_PIXEL_DELAY, HEAVY_CANVAS_DELAY, HEAVY_PIXEL_DELAY, HEAVY_RUN_FOR, HEAVY_USERS,
    },
    error::ClientError,
    identity::UserIdentity,
    protocol::{PixelBounds, PixelFrameCodec},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum EncodingMode {
    /// `postTile` JSON envelopes
    #[default]
    Json,
    /// Fixed-layout binary pixel frames
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PixelPattern {
    /// Uniformly random pixels
    #[default]
    Random,
    /// Row-by-row sweep of the whole canvas
    Sweep,
}

/// Inclusive bounds for a uniformly random delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_secs(min: f64, max: f64) -> Result<Self, ClientError> {
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || max < min {
            return Err(ClientError::InvalidConfig(format!(
                "delay range {min}..{max} must be non-negative with min <= max"
            )));
        }
        Ok(Self {
            min: seconds(min)?,
            max: seconds(max)?,
        })
    }

    fn from_pair((min, max): (f64, f64)) -> Self {
        Self {
            min: Duration::from_secs_f64(min),
            max: Duration::from_secs_f64(max),
        }
    }
}

impl FromStr for DelayRange {
    type Err = ClientError;

    /// Parses `MIN..MAX` in seconds, e.g. `0.2..1.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s.split_once("..").ok_or_else(|| {
            ClientError::InvalidConfig(format!("expected MIN..MAX seconds, got {s:?}"))
        })?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| ClientError::InvalidConfig(format!("bad delay {v:?}: {e}")))
        };
        Self::from_secs(parse(min)?, parse(max)?)
    }
}

impl fmt::Display for DelayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.min.as_secs_f64(),
            self.max.as_secs_f64()
        )
    }
}

/// Everything a simulation run needs, passed into the controller up front.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub endpoint: Url,
    pub user_count: usize,
    /// When non-empty, sessions re-authenticate as these users instead of
    /// requesting fresh identities, and `user_count` is ignored.
    pub identities: Vec<UserIdentity>,
    pub pixel_delay: DelayRange,
    pub canvas_delay: DelayRange,
    pub canvas_refresh: bool,
    pub edge: i16,
    /// Lowest row the pixel generator targets, to stay clear of UI chrome.
    pub y_min: i16,
    pub encoding: EncodingMode,
    pub pattern: PixelPattern,
    pub identity_len: usize,
    /// `None` runs until interrupted.
    pub run_for: Option<Duration>,
    /// `None` waits for the auth reply indefinitely.
    pub handshake_timeout: Option<Duration>,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            user_count: 1,
            identities: Vec::new(),
            pixel_delay: DelayRange::from_pair(DEFAULT_PIXEL_DELAY),
            canvas_delay: DelayRange::from_pair(DEFAULT_CANVAS_DELAY),
            canvas_refresh: true,
            edge: DEFAULT_EDGE,
            y_min: 0,
            encoding: EncodingMode::Json,
            pattern: PixelPattern::Random,
            identity_len: DEFAULT_IDENTITY_LEN,
            run_for: None,
            handshake_timeout: None,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// One user spraying binary pixels below the top chrome band.
    pub fn light() -> Self {
        Self {
            encoding: EncodingMode::Binary,
            y_min: 100,
            ..Self::default()
        }
    }

    /// Fifty JSON users over a short burst with long-horizon delays.
    pub fn heavy() -> Self {
        Self {
            user_count: HEAVY_USERS,
            pixel_delay: DelayRange::from_pair(HEAVY_PIXEL_DELAY),
            canvas_delay: DelayRange::from_pair(HEAVY_CANVAS_DELAY),
            run_for: Some(HEAVY_RUN_FOR),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        match self.endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ClientError::InvalidConfig(format!(
                    "endpoint scheme must be ws or wss, got {other}"
                )));
            }
        }
        if self.endpoint.host_str().is_none() {
            return Err(ClientError::InvalidConfig(format!(
                "endpoint {} has no host",
                self.endpoint
            )));
        }
        if self.edge <= 0 {
            return Err(ClientError::InvalidConfig(format!(
                "edge must be positive, got {}",
                self.edge
            )));
        }
        if !(0..=self.edge).contains(&self.y_min) {
            return Err(ClientError::InvalidConfig(format!(
                "y_min {} must lie within 0..={}",
                self.y_min, self.edge
            )));
        }
        for (name, range) in [("pixel", &self.pixel_delay), ("canvas", &self.canvas_delay)] {
            if range.max < range.min {
                return Err(ClientError::InvalidConfig(format!(
                    "{name} delay {range} has min > max"
                )));
            }
        }
        if self.identity_len == 0 {
            return Err(ClientError::InvalidConfig(
                "identity length must be positive".to_string(),
            ));
        }
        if self.encoding == EncodingMode::Binary {
            if let Some(long) = self
                .identities
                .iter()
                .find(|id| id.as_bytes().len() > self.identity_len)
            {
                return Err(ClientError::InvalidConfig(format!(
                    "identity {long} does not fit in {} bytes",
                    self.identity_len
                )));
            }
        }
        Ok(())
    }

    /// Sessions the controller will attempt.
    pub fn planned_sessions(&self) -> usize {
        if self.identities.is_empty() {
            self.user_count
        } else {
            self.identities.len()
        }
    }

    pub fn codec(&self) -> PixelFrameCodec {
        PixelFrameCodec::new(self.identity_len, PixelBounds { edge: self.edge })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Preset {
    /// Start from the built-in defaults
    #[default]
    Default,
    /// One binary-mode user, fast pixels
    Light,
    /// Fifty JSON users, slow pixels, 20 second burst
    Heavy,
}

/// Command line for `place-loadgen`. Unset flags fall back to the preset.
#[derive(Debug, Parser)]
#[command(name = "place-loadgen")]
#[command(about = "Simulate many users placing pixels on a place canvas server")]
pub struct LoadArgs {
    /// WebSocket endpoint of the canvas server
    #[arg(long, env = "PLACE_ENDPOINT")]
    pub endpoint: Option<Url>,

    /// Starting point for every other option
    #[arg(long, value_enum, env = "PLACE_PRESET", default_value_t)]
    pub preset: Preset,

    /// Number of simulated users
    #[arg(short, long, env = "PLACE_USERS")]
    pub users: Option<usize>,

    /// Re-authenticate as this existing user instead of requesting one
    /// (repeatable, or comma separated)
    #[arg(long = "identity", env = "PLACE_IDENTITIES", value_delimiter = ',')]
    pub identities: Vec<UserIdentity>,

    /// Delay between pixels, MIN..MAX seconds
    #[arg(long, env = "PLACE_PIXEL_DELAY")]
    pub pixel_delay: Option<DelayRange>,

    /// Delay between canvas refreshes, MIN..MAX seconds
    #[arg(long, env = "PLACE_CANVAS_DELAY")]
    pub canvas_delay: Option<DelayRange>,

    /// Disable the canvas refresh generator
    #[arg(long)]
    pub no_canvas_refresh: bool,

    /// Canvas side length
    #[arg(long, env = "PLACE_EDGE")]
    pub edge: Option<i16>,

    /// Lowest row to place pixels on
    #[arg(long, env = "PLACE_Y_MIN")]
    pub y_min: Option<i16>,

    /// Pixel wire encoding
    #[arg(long, value_enum, env = "PLACE_ENCODING")]
    pub encoding: Option<EncodingMode>,

    /// Pixel placement pattern
    #[arg(long, value_enum, env = "PLACE_PATTERN")]
    pub pattern: Option<PixelPattern>,

    /// Identity width in binary pixel frames, in bytes
    #[arg(long, env = "PLACE_IDENTITY_LEN")]
    pub identity_len: Option<usize>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long, env = "PLACE_RUN_FOR")]
    pub run_for: Option<f64>,

    /// Give up on a handshake after this many seconds (default: wait forever)
    #[arg(long, env = "PLACE_HANDSHAKE_TIMEOUT")]
    pub handshake_timeout: Option<f64>,

    /// Seed for reproducible pixel streams
    #[arg(long, env = "PLACE_SEED")]
    pub seed: Option<u64>,
}

impl LoadArgs {
    pub fn into_config(self) -> Result<SimulationConfig, ClientError> {
        let mut config = match self.preset {
            Preset::Default => SimulationConfig::default(),
            Preset::Light => SimulationConfig::light(),
            Preset::Heavy => SimulationConfig::heavy(),
        };

        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(users) = self.users {
            config.user_count = users;
        }
        config.identities = self.identities;
        if let Some(range) = self.pixel_delay {
            config.pixel_delay = range;
        }
        if let Some(range) = self.canvas_delay {
            config.canvas_delay = range;
        }
        if self.no_canvas_refresh {
            config.canvas_refresh = false;
        }
        if let Some(edge) = self.edge {
            config.edge = edge;
        }
        if let Some(y_min) = self.y_min {
            config.y_min = y_min;
        }
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(pattern) = self.pattern {
            config.pattern = pattern;
        }
        if let Some(len) = self.identity_len {
            config.identity_len = len;
        }
        if let Some(secs) = self.run_for {
            config.run_for = Some(seconds(secs)?);
        }
        if let Some(secs) = self.handshake_timeout {
            config.handshake_timeout = Some(seconds(secs)?);
        }
        config.seed = self.seed;

        config.validate()?;
        Ok(config)
    }
}

fn seconds(value: f64) -> Result<Duration, ClientError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ClientError::InvalidConfig(format!("bad duration {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delay_ranges() {
        let range: DelayRange = "0.2..1.0".parse().unwrap();
        assert_eq!(range.min, Duration::from_millis(200));
        assert_eq!(range.max, Duration::from_secs(1));

        assert!("1.0..0.2".parse::<DelayRange>().is_err());
        assert!("-1..2".parse::<DelayRange>().is_err());
        assert!("fast".parse::<DelayRange>().is_err());
        assert!(matches!(
            "0..1e20".parse::<DelayRange>(),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn presets_carry_their_traffic_shape() {
        let light = SimulationConfig::light();
        assert_eq!(light.encoding, EncodingMode::Binary);
        assert_eq!(light.y_min, 100);
        assert_eq!(light.user_count, 1);

        let heavy = SimulationConfig::heavy();
        assert_eq!(heavy.user_count, 50);
        assert_eq!(heavy.pixel_delay.max, Duration::from_secs(30));
        assert_eq!(heavy.canvas_delay.max, Duration::from_secs(120));
        assert_eq!(heavy.run_for, Some(Duration::from_secs(20)));
        heavy.validate().unwrap();
    }

    #[test]
    fn rejects_misconfiguration() {
        let mut config = SimulationConfig {
            endpoint: Url::parse("http://localhost:3001/ws").unwrap(),
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::InvalidConfig(_))));

        config.endpoint = Url::parse("wss://pixel.example.com/ws").unwrap();
        config.validate().unwrap();

        config.y_min = 600;
        assert!(config.validate().is_err());
        config.y_min = 0;

        config.encoding = EncodingMode::Binary;
        config.identity_len = 4;
        config.identities = vec![UserIdentity::new("much-too-long").unwrap()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_flags_override_the_preset() {
        let args = LoadArgs::try_parse_from([
            "place-loadgen",
            "--preset",
            "heavy",
            "--users",
            "3",
            "--encoding",
            "binary",
            "--pixel-delay",
            "0.01..0.02",
            "--identity",
            "ABC-1",
            "--identity",
            "ABC-2",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.user_count, 3);
        assert_eq!(config.encoding, EncodingMode::Binary);
        assert_eq!(config.pixel_delay.max, Duration::from_millis(20));
        assert_eq!(config.canvas_delay.max, Duration::from_secs(120));
        assert_eq!(config.run_for, Some(Duration::from_secs(20)));
        assert_eq!(config.planned_sessions(), 2);
    }

    #[test]
    fn identities_accept_a_comma_separated_list() {
        let config = LoadArgs::try_parse_from(["place-loadgen", "--identity", "ABC-1,ABC-2,ABC-3"])
            .unwrap()
            .into_config()
            .unwrap();
        let names: Vec<_> = config.identities.iter().map(|i| i.as_str()).collect();
        assert_eq!(names, vec!["ABC-1", "ABC-2", "ABC-3"]);
    }
}
