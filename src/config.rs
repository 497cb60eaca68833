//! Environment-driven configuration.
//!
//! The bridge reads its entire configuration from the process environment
//! once, at activation, into an immutable [`BridgeConfig`]. The environment
//! doubles as the second activation factor: with neither `GDRB_TOKEN` nor
//! `GODOT_DEBUG_SERVER=1` present, [`BridgeConfig::from_env`] returns `None`
//! and the bridge never starts.

use std::env;

use crate::registry::Tier;

pub const ENV_TOKEN: &str = "GDRB_TOKEN";
/// Legacy activation flag; `"1"` starts the bridge with a generated token.
pub const ENV_LEGACY_ENABLE: &str = "GODOT_DEBUG_SERVER";
pub const ENV_PORT: &str = "GDRB_PORT";
pub const ENV_TIER: &str = "GDRB_TIER";
pub const ENV_DANGER: &str = "GDRB_ENABLE_DANGER";
pub const ENV_INPUT_MODE: &str = "GDRB_INPUT_MODE";
pub const ENV_FORCE_WINDOWED: &str = "GDRB_FORCE_WINDOWED";

/// Token length in characters drawn from `TOKEN_ALPHABET` (just under 143
/// bits of entropy).
pub const TOKEN_LEN: usize = 24;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Routing strategy for injected input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Events go straight into the viewport input queue; the OS cursor never
    /// moves, and untagged device input is filtered out.
    Synthetic,
    /// Additionally warp the OS cursor to each event position.
    Os,
}

impl InputMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::Synthetic => "synthetic",
            InputMode::Os => "os",
        }
    }
}

/// Immutable bridge configuration resolved at activation.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Shared secret every non-exempt request must carry.
    pub token: String,
    /// Loopback port to bind; 0 lets the kernel choose.
    pub port: u16,
    /// Upper bound on what commands this session may run.
    pub tier: Tier,
    /// Second gate for `eval`, independent of tier.
    pub danger_enabled: bool,
    pub input_mode: InputMode,
    pub force_windowed: bool,
}

impl BridgeConfig {
    /// Read configuration from the process environment. Returns `None` when
    /// the environment gate fails, which callers treat as "do not start".
    pub fn from_env() -> Option<BridgeConfig> {
        Self::from_vars(
            env::var(ENV_TOKEN).ok().as_deref(),
            env::var(ENV_LEGACY_ENABLE).ok().as_deref(),
            env::var(ENV_PORT).ok().as_deref(),
            env::var(ENV_TIER).ok().as_deref(),
            env::var(ENV_DANGER).ok().as_deref(),
            env::var(ENV_INPUT_MODE).ok().as_deref(),
            env::var(ENV_FORCE_WINDOWED).ok().as_deref(),
        )
    }

    /// Pure form of [`from_env`](Self::from_env), driven by explicit values.
    pub fn from_vars(
        token: Option<&str>,
        legacy: Option<&str>,
        port: Option<&str>,
        tier: Option<&str>,
        danger: Option<&str>,
        input_mode: Option<&str>,
        force_windowed: Option<&str>,
    ) -> Option<BridgeConfig> {
        let explicit_token = token.filter(|t| !t.is_empty());
        let legacy_enabled = legacy == Some("1");
        if explicit_token.is_none() && !legacy_enabled {
            return None;
        }

        let token = match explicit_token {
            Some(token) => token.to_string(),
            None => match generate_token() {
                Ok(token) => token,
                Err(err) => {
                    tracing::error!("token generation failed, bridge will not start: {err}");
                    return None;
                }
            },
        };

        let port = port.and_then(|p| p.trim().parse::<u16>().ok()).unwrap_or(0);

        let tier = tier
            .and_then(|t| t.trim().parse::<i64>().ok())
            .map(Tier::from_level)
            .unwrap_or(Tier::Input);

        Some(BridgeConfig {
            token,
            port,
            tier,
            danger_enabled: danger == Some("1"),
            input_mode: match input_mode {
                Some("os") => InputMode::Os,
                _ => InputMode::Synthetic,
            },
            force_windowed: force_windowed == Some("1"),
        })
    }
}

/// Session identity, fixed for the lifetime of the process. Initialized
/// before the I/O worker starts and read-only thereafter, so it crosses
/// threads without a lock.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub tier: Tier,
    pub danger_enabled: bool,
    pub input_mode: InputMode,
}

impl Session {
    pub fn from_config(config: &BridgeConfig) -> Session {
        Session {
            token: config.token.clone(),
            tier: config.tier,
            danger_enabled: config.danger_enabled,
            input_mode: config.input_mode,
        }
    }
}

/// Generate a session token: [`TOKEN_LEN`] characters from the alphanumeric
/// alphabet, sourced from the OS RNG.
pub fn generate_token() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; TOKEN_LEN];
    getrandom::fill(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| TOKEN_ALPHABET[(*b as usize) % TOKEN_ALPHABET.len()] as char)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_requires_token_or_legacy_flag() {
        assert!(BridgeConfig::from_vars(None, None, None, None, None, None, None).is_none());
        assert!(BridgeConfig::from_vars(Some(""), None, None, None, None, None, None).is_none());
        assert!(
            BridgeConfig::from_vars(None, Some("0"), None, None, None, None, None).is_none()
        );
        assert!(
            BridgeConfig::from_vars(Some("tok"), None, None, None, None, None, None).is_some()
        );
        assert!(BridgeConfig::from_vars(None, Some("1"), None, None, None, None, None).is_some());
    }

    #[test]
    fn test_legacy_flag_generates_token() {
        let config =
            BridgeConfig::from_vars(None, Some("1"), None, None, None, None, None).unwrap();
        assert_eq!(config.token.len(), TOKEN_LEN);
        assert!(config.token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_defaults() {
        let config =
            BridgeConfig::from_vars(Some("tok"), None, None, None, None, None, None).unwrap();
        assert_eq!(config.port, 0);
        assert_eq!(config.tier, Tier::Input);
        assert!(!config.danger_enabled);
        assert_eq!(config.input_mode, InputMode::Synthetic);
        assert!(!config.force_windowed);
    }

    #[test]
    fn test_tier_is_clamped() {
        let config = BridgeConfig::from_vars(
            Some("tok"),
            None,
            None,
            Some("9"),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(config.tier, Tier::Danger);

        let config = BridgeConfig::from_vars(
            Some("tok"),
            None,
            None,
            Some("-2"),
            None,
            None,
            None,
        )
        .unwrap();
        assert_eq!(config.tier, Tier::Observe);
    }

    #[test]
    fn test_danger_requires_exact_one() {
        let on = BridgeConfig::from_vars(Some("t"), None, None, None, Some("1"), None, None)
            .unwrap();
        assert!(on.danger_enabled);
        let off = BridgeConfig::from_vars(Some("t"), None, None, None, Some("true"), None, None)
            .unwrap();
        assert!(!off.danger_enabled);
    }

    #[test]
    fn test_input_mode_parsing() {
        let os = BridgeConfig::from_vars(Some("t"), None, None, None, None, Some("os"), None)
            .unwrap();
        assert_eq!(os.input_mode, InputMode::Os);
        let other =
            BridgeConfig::from_vars(Some("t"), None, None, None, None, Some("weird"), None)
                .unwrap();
        assert_eq!(other.input_mode, InputMode::Synthetic);
    }

    #[test]
    fn test_port_parsing() {
        let config =
            BridgeConfig::from_vars(Some("t"), None, Some("9009"), None, None, None, None)
                .unwrap();
        assert_eq!(config.port, 9009);
        let bad = BridgeConfig::from_vars(Some("t"), None, Some("nope"), None, None, None, None)
            .unwrap();
        assert_eq!(bad.port, 0);
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(generate_token().unwrap(), generate_token().unwrap());
    }
}
