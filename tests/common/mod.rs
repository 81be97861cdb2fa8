//! Common test utilities
//!
//! Fake downloader scripts and a fixed track counter shared by the integration tests.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use melodrop::download::{ToolOptions, TrackCounter};

/// yt-dlp stand-in: reports progress and writes one audio file next to the `-o` template
pub const YTDLP_OK: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
echo "[youtube] Extracting URL: $1"
echo "[download] Destination: track.webm"
echo "[download]  42.0% of    3.00MiB at    1.00MiB/s ETA 00:02"
echo "[download] 100% of    3.00MiB in 00:00:03 at 1.00MiB/s"
if [ -n "$out" ]; then printf 'audio' > "$(dirname "$out")/track.mp3"; fi
exit 0
"#;

pub const YTDLP_PLAYLIST: &str = r#"#!/bin/sh
echo "[download] Downloading item 1 of 2"
echo "[download]  50.0% of 3.00MiB at 1.00MiB/s ETA 00:02"
echo "[download] 100% of 3.00MiB"
echo "[download] Downloading item 2 of 2"
echo "[download] 100% of 3.00MiB"
exit 0
"#;

pub const YTDLP_FAIL: &str = r#"#!/bin/sh
echo "[download]  10.0% of 3.00MiB"
echo "WARNING: [youtube] falling back to another client" >&2
echo "ERROR: [youtube] abc123: Video unavailable" >&2
exit 1
"#;

pub const YTDLP_SILENT_FAIL: &str = "#!/bin/sh\nexit 3\n";

pub const YTDLP_SLOW: &str = "#!/bin/sh\nsleep 1\necho \"[download] 100% of 1.00MiB\"\nexit 0\n";

/// Progress lines separated by carriage returns, after a line that is not UTF-8
pub const YTDLP_CARRIAGE: &str = "#!/bin/sh\nprintf '\\377\\376 junk\\n[download]  10.0%% of 3.00MiB\\r[download]  55.5%% of 3.00MiB\\n'\nsleep 1\nexit 0\n";

/// Writes far more to stderr than a pipe buffer holds before finishing
pub const YTDLP_STDERR_FLOOD: &str = "#!/bin/sh\nhead -c 200000 /dev/zero | tr '\\0' x >&2\necho \"[download] 100% of 1.00MiB\"\nexit 0\n";

pub const SPOTDL_OK: &str = r#"#!/bin/sh
echo "Processing query: $1"
echo "Found 2 songs in Discovery (Album)"
echo "Downloaded \"Daft Punk - One More Time\": https://music.youtube.com/watch?v=abc"
echo "Skipping Daft Punk - Aerodynamic (file already exists) (duplicate)"
exit 0
"#;

const SCRIPTS: &[(&str, &str)] = &[
    ("ytdlp-ok", YTDLP_OK),
    ("ytdlp-playlist", YTDLP_PLAYLIST),
    ("ytdlp-fail", YTDLP_FAIL),
    ("ytdlp-silent-fail", YTDLP_SILENT_FAIL),
    ("ytdlp-slow", YTDLP_SLOW),
    ("ytdlp-carriage", YTDLP_CARRIAGE),
    ("ytdlp-stderr-flood", YTDLP_STDERR_FLOOD),
    ("spotdl-ok", SPOTDL_OK),
];

/// Directory holding every fake tool. Written once per test binary, before any
/// test spawns a process, so no script is executed while still open for writing.
pub fn scripts_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("melodrop-fake-tools-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
}

pub fn script(name: &str) -> String {
    scripts_dir().join(name).display().to_string()
}

/// Tool options using the named fake yt-dlp and the well-behaved fake spotdl.
pub fn fake_tools(ytdlp: &str) -> ToolOptions {
    ToolOptions {
        ytdlp_bin: script(ytdlp),
        spotdl_bin: script("spotdl-ok"),
        ..ToolOptions::default()
    }
}

/// Counts every URL as the same number of tracks.
pub struct FixedCounter(pub u32);

#[async_trait]
impl TrackCounter for FixedCounter {
    async fn count(&self, _url: &str) -> u32 {
        self.0
    }
}
