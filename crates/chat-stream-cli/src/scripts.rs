use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chat_stream::transport::{ScriptedResponse, ScriptedTransport};

/// File extension of recorded data-stream responses
pub const SCRIPT_EXTENSION: &str = "stream";

/// Every script in `dir`, in file-name order
pub fn list_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read script directory {}", dir.display()))?;

    let mut scripts = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION) {
            scripts.push(path);
        }
    }
    scripts.sort();
    Ok(scripts)
}

/// A recorded response body, replayed in chunks of `chunk_size` bytes
pub fn load_script(path: &Path, chunk_size: usize) -> Result<ScriptedResponse> {
    let body = fs::read(path).with_context(|| format!("Failed to read script {}", path.display()))?;
    Ok(ScriptedResponse::body(body, chunk_size))
}

/// A transport that answers each request with the next script
pub fn transport_from(paths: &[PathBuf], chunk_size: usize) -> Result<ScriptedTransport> {
    let responses = paths
        .iter()
        .map(|path| load_script(path, chunk_size))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(scripts = responses.len(), chunk_size, "loaded scripts");
    Ok(ScriptedTransport::new(responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chat_stream::{ChatSession, SessionConfig, SubmitOptions};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_list_scripts_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("02-answer.stream"), "0:\"b\"\n").unwrap();
        fs::write(dir.path().join("01-tool.stream"), "0:\"a\"\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scripts = list_scripts(dir.path()).unwrap();
        let names: Vec<_> = scripts
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["01-tool.stream", "02-answer.stream"]);
    }

    #[test]
    fn test_load_script_chunks_body() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.stream");
        fs::write(&path, "0:\"Hello\"\n").unwrap();

        let ScriptedResponse::Chunks(chunks) = load_script(&path, 4).unwrap() else {
            panic!("Expected chunked response");
        };
        let chunks: Vec<Bytes> = chunks.into_iter().map(|chunk| chunk.unwrap()).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"0:\"Hello\"\n".to_vec());
    }

    #[test]
    fn test_missing_script_dir() {
        let err = list_scripts(Path::new("/nonexistent/scripts")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/scripts"));
    }

    #[test]
    fn test_transport_from_queues_every_script() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("01.stream");
        let second = dir.path().join("02.stream");
        fs::write(&first, "0:\"a\"\n").unwrap();
        fs::write(&second, "0:\"b\"\n").unwrap();

        let transport = transport_from(&[first, second], 64).unwrap();
        assert_eq!(transport.remaining(), 2);
    }

    #[tokio::test]
    async fn test_bundled_scripts_replay_weather_turn() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scripts");
        let scripts = list_scripts(&dir).unwrap();
        assert_eq!(scripts.len(), 2);

        // five-byte chunks split the degree sign across chunks
        let transport = transport_from(&scripts, 5).unwrap();
        let session = ChatSession::new(transport, SessionConfig::default().with_max_steps(2));
        session
            .submit("What's the weather in San Francisco?", SubmitOptions::default())
            .await
            .unwrap();

        let messages = session.messages();
        assert_eq!(messages.len(), 3);
        let call = messages[1].tool_invocations().next().unwrap();
        assert_eq!(call.args["location"], "San Francisco, CA");
        assert!(call.is_resolved());
        assert_eq!(
            messages[2].text_content(),
            "It's currently 72°F in San Francisco, CA."
        );
        assert_eq!(session.data(), vec![json!({"source": "weather-api"})]);
    }
}
