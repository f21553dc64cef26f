use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {env_var}: {reason}")]
    InvalidValue { env_var: String, reason: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Environment variable that sets a dotted settings key
pub fn to_env_var(field: &str) -> String {
    format!("CHAT_STREAM_{}", field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("replay.chunk_size"), "CHAT_STREAM_REPLAY__CHUNK_SIZE");
        assert_eq!(to_env_var("session.max_steps"), "CHAT_STREAM_SESSION__MAX_STEPS");
    }
}
