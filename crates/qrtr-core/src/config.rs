//! Bus construction options.

use crate::env::env_get_opt;

/// Options accepted by `Bus::new`/`Bus::open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// If nonzero, Bus construction blocks (asynchronously) until the
    /// initial `NEW_LOOKUP` settles or this many milliseconds pass, whichever
    /// comes first. Zero means construction returns immediately.
    pub lookup_timeout_ms: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { lookup_timeout_ms: 0 }
    }
}

impl BusConfig {
    pub fn new(lookup_timeout_ms: u32) -> Self {
        Self { lookup_timeout_ms }
    }

    /// Build a config from `QRTR_LOOKUP_TIMEOUT_MS`, falling back to
    /// [`BusConfig::default`] if unset or unparsable.
    ///
    /// Explicit opt-in only — `Bus::open` never consults the environment on
    /// its own; callers that want the override call this themselves.
    pub fn from_env() -> Self {
        Self {
            lookup_timeout_ms: env_get_opt("QRTR_LOOKUP_TIMEOUT_MS").unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero_timeout() {
        assert_eq!(BusConfig::default().lookup_timeout_ms, 0);
    }

    #[test]
    fn test_from_env_honors_override() {
        std::env::set_var("QRTR_LOOKUP_TIMEOUT_MS", "250");
        assert_eq!(BusConfig::from_env().lookup_timeout_ms, 250);
        std::env::remove_var("QRTR_LOOKUP_TIMEOUT_MS");
    }

    #[test]
    fn test_from_env_falls_back_when_unset() {
        std::env::remove_var("QRTR_LOOKUP_TIMEOUT_MS");
        assert_eq!(BusConfig::from_env(), BusConfig::default());
    }

    #[test]
    fn test_from_env_falls_back_when_unparsable() {
        std::env::set_var("QRTR_LOOKUP_TIMEOUT_MS", "garbage");
        assert_eq!(BusConfig::from_env(), BusConfig::default());
        std::env::remove_var("QRTR_LOOKUP_TIMEOUT_MS");
    }
}
