// External tool resolver for exiftool, ffprobe, and the face-model adapter.
//
// Resolution order:
// 1) Environment variable override (EXIFTOOL_BIN, FFPROBE_BIN, FACE_MODEL_BIN)
// 2) Bare binary name looked up on PATH

use std::env;
use std::path::PathBuf;

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        if !v.is_empty() {
            return PathBuf::from(v);
        }
    }
    PathBuf::from(default_name)
}

pub fn exiftool_path() -> PathBuf {
    resolve_tool("EXIFTOOL_BIN", "exiftool")
}

pub fn ffprobe_path() -> PathBuf {
    resolve_tool("FFPROBE_BIN", "ffprobe")
}

pub fn face_model_path() -> PathBuf {
    resolve_tool("FACE_MODEL_BIN", "face-model")
}

pub fn is_tool_available(path: &PathBuf) -> bool {
    if path.exists() {
        return true;
    }
    std::process::Command::new(path)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// The OS account running this process, for `MediaObject.created_by`.
pub fn current_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Best-effort local IP for `MediaObject.created_ip`: the source address the
/// kernel would pick to reach the public internet. No packet is actually
/// sent — `connect` on a UDP socket just resolves routing.
pub fn local_ip() -> Option<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_tool_falls_back_to_default_name() {
        std::env::remove_var("MEDIACATALOG_TEST_NONEXISTENT");
        let path = resolve_tool("MEDIACATALOG_TEST_NONEXISTENT", "testcmd");
        assert_eq!(path, PathBuf::from("testcmd"));
    }

    #[test]
    fn resolve_tool_honors_env_override() {
        std::env::set_var("MEDIACATALOG_TEST_TOOL", "/opt/tools/mytool");
        let path = resolve_tool("MEDIACATALOG_TEST_TOOL", "default");
        assert_eq!(path, PathBuf::from("/opt/tools/mytool"));
        std::env::remove_var("MEDIACATALOG_TEST_TOOL");
    }
}
