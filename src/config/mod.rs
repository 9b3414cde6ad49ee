use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_API_URL: &str = "http://localhost:6689";
pub(crate) const DEFAULT_AUTOSAVE_MS: u32 = 1500;
pub(crate) const DEFAULT_POLL_MS: u32 = 2000;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EnvConfig {
    pub api_url: String,
    /// Quiet period before a burst of keystrokes is written.
    pub autosave_ms: u32,
    /// Change stream polling interval.
    pub poll_ms: u32,
}

impl EnvConfig {
    pub fn new() -> Self {
        let mut config = Self::default();

        // Both `window.ENV.API_URL` and `window.ENV.api_url` are accepted.
        let Some(env) = web_sys::window()
            .and_then(|w| w.get("ENV"))
            .filter(|env| !env.is_undefined() && env.is_object())
        else {
            return config;
        };

        let read = |key: &str| js_sys::Reflect::get(&env, &key.into()).ok();

        if let Some(url) = read("API_URL")
            .and_then(|v| v.as_string())
            .or_else(|| read("api_url").and_then(|v| v.as_string()))
        {
            config.api_url = url;
        }

        if let Some(ms) = read("AUTOSAVE_MS").and_then(|v| v.as_f64()) {
            config.autosave_ms = clamp_ms(ms, config.autosave_ms);
        }

        if let Some(ms) = read("POLL_MS").and_then(|v| v.as_f64()) {
            config.poll_ms = clamp_ms(ms, config.poll_ms);
        }

        config
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            autosave_ms: DEFAULT_AUTOSAVE_MS,
            poll_ms: DEFAULT_POLL_MS,
        }
    }
}

/// Accept only positive, finite millisecond values; anything else keeps the default.
fn clamp_ms(raw: f64, fallback: u32) -> u32 {
    if raw.is_finite() && raw >= 1.0 && raw <= u32::MAX as f64 {
        raw.round() as u32
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EnvConfig::default();
        assert_eq!(c.api_url, "http://localhost:6689");
        assert_eq!(c.autosave_ms, 1500);
        assert_eq!(c.poll_ms, 2000);
    }

    #[test]
    fn test_clamp_ms_rejects_garbage() {
        assert_eq!(clamp_ms(f64::NAN, 7), 7);
        assert_eq!(clamp_ms(-5.0, 7), 7);
        assert_eq!(clamp_ms(0.0, 7), 7);
        assert_eq!(clamp_ms(250.4, 7), 250);
    }
}
