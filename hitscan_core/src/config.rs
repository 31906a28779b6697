use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;

/// Charset of the stock scan, ordered by rough likelihood of a
/// character class appearing in a key.
pub const DEFAULT_CHARSET: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789{}_!?'#%+/ ;[`@-\".<,*|&$(]=)^>\\:~";

/// Two symbols assumed absent from the secret, used to establish the
/// calibration baseline. DEL is the second filler because it rarely
/// survives into printable keys.
pub const DEFAULT_CALIBRATION_FILLERS: &str = "^\u{7f}";

pub fn parse_addr(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(digits, 16)
        .map_err(|e| format!("invalid breakpoint address {trimmed:?}: {e}"))
}

fn de_addr<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| parse_addr(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn de_addr_required<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_addr(&raw).map_err(serde::de::Error::custom)
}

/// Instrumented code locations, as `"0x..."` hex strings in TOML.
/// Any subset may be absent, though scoring is only meaningful with at
/// least one of positive/negative present.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BreakpointSettings {
    #[serde(default, deserialize_with = "de_addr")]
    pub positive: Option<u64>,
    #[serde(default, deserialize_with = "de_addr")]
    pub negative: Option<u64>,
    #[serde(default, deserialize_with = "de_addr")]
    pub win: Option<u64>,
    #[serde(default, deserialize_with = "de_addr")]
    pub lose: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    #[serde(default)]
    pub known_prefix: String,
    #[serde(default)]
    pub known_suffix: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_charset")]
    pub charset: String,
    #[serde(default = "default_fillers")]
    pub calibration_fillers: String,
}

fn default_chunk_size() -> usize {
    1
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

fn default_fillers() -> String {
    DEFAULT_CALIBRATION_FILLERS.to_string()
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            known_prefix: String::new(),
            known_suffix: String::new(),
            chunk_size: default_chunk_size(),
            charset: default_charset(),
            calibration_fillers: default_fillers(),
        }
    }
}

impl SearchSettings {
    /// The candidate symbols in operator order, first occurrence wins.
    pub fn charset_symbols(&self) -> Vec<char> {
        let mut seen = HashSet::new();
        self.charset.chars().filter(|c| seen.insert(*c)).collect()
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct PersistentSettings {
    /// Address the checkpoint is captured at, once.
    #[serde(deserialize_with = "de_addr_required")]
    pub start: u64,
    /// Address the target loops back to for its next input.
    #[serde(deserialize_with = "de_addr_required")]
    pub end: u64,
    /// Address of the input buffer candidate bytes are written to.
    #[serde(deserialize_with = "de_addr_required")]
    pub buffer: u64,
    #[serde(default = "default_checkpoint_ceiling")]
    pub checkpoint_ceiling: u32,
}

fn default_checkpoint_ceiling() -> u32 {
    crate::executor::DEFAULT_CHECKPOINT_CEILING
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct HitscanConfig {
    #[serde(default)]
    pub breakpoints: BreakpointSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub persistent: Option<PersistentSettings>,
}

impl HitscanConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: HitscanConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}
