use std::path::{Path, PathBuf};

use chat_stream::SessionConfig;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{to_env_var, ConfigError};

#[derive(Debug, Deserialize)]
pub struct ReplaySettings {
    /// Directory holding recorded data-stream scripts for `chat`
    #[serde(default)]
    pub script_dir: Option<PathBuf>,
    /// Bytes per chunk when replaying a script
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            script_dir: None,
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub replay: ReplaySettings,
}

impl Settings {
    /// Defaults, then the optional TOML file, then `CHAT_STREAM_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("session.max_steps", 1_i64)?
            .set_default("replay.chunk_size", default_chunk_size() as i64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("CHAT_STREAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.replay.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                env_var: to_env_var("replay.chunk_size"),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn default_chunk_size() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("CHAT_STREAM_") {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.session.max_steps, 1);
        assert!(!settings.session.send_extra_message_fields);
        assert!(settings.session.id.is_none());
        assert_eq!(settings.replay.chunk_size, 64);
        assert!(settings.replay.script_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("CHAT_STREAM_SESSION__MAX_STEPS", "5");
        env::set_var("CHAT_STREAM_SESSION__SEND_EXTRA_MESSAGE_FIELDS", "true");
        env::set_var("CHAT_STREAM_REPLAY__CHUNK_SIZE", "3");

        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.session.max_steps, 5);
        assert!(settings.session.send_extra_message_fields);
        assert_eq!(settings.replay.chunk_size, 3);

        // Clean up
        env::remove_var("CHAT_STREAM_SESSION__MAX_STEPS");
        env::remove_var("CHAT_STREAM_SESSION__SEND_EXTRA_MESSAGE_FIELDS");
        env::remove_var("CHAT_STREAM_REPLAY__CHUNK_SIZE");
    }

    #[test]
    #[serial]
    fn test_file_then_environment() {
        clean_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[session]\nid = \"demo\"\nmax_steps = 2\n\n[replay]\nscript_dir = \"recordings\"\nchunk_size = 16"
        )
        .unwrap();
        env::set_var("CHAT_STREAM_REPLAY__CHUNK_SIZE", "8");

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.session.id.as_deref(), Some("demo"));
        assert_eq!(settings.session.max_steps, 2);
        assert_eq!(settings.replay.script_dir, Some(PathBuf::from("recordings")));
        assert_eq!(settings.replay.chunk_size, 8);

        env::remove_var("CHAT_STREAM_REPLAY__CHUNK_SIZE");
    }

    #[test]
    #[serial]
    fn test_zero_chunk_size_rejected() {
        clean_env();
        env::set_var("CHAT_STREAM_REPLAY__CHUNK_SIZE", "0");

        let err = Settings::load(None).unwrap_err();
        match err {
            ConfigError::InvalidValue { env_var, .. } => {
                assert_eq!(env_var, "CHAT_STREAM_REPLAY__CHUNK_SIZE");
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        env::remove_var("CHAT_STREAM_REPLAY__CHUNK_SIZE");
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        clean_env();
        let result = Settings::load(Some(Path::new("/nonexistent/chat-stream.toml")));
        assert!(matches!(result, Err(ConfigError::Other(_))));
    }
}
