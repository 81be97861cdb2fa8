//! Progress scraping of downloader stdout.
//!
//! Neither tool documents its output, so each parser is a small heuristic pinned
//! by tests to literal sample lines. Unrecognized lines yield `None` and are
//! dropped by the caller; a parser never fails.

use lazy_regex::regex_captures;

use crate::download::tool::Tool;

/// yt-dlp prefixes every transfer report with this token
const YTDLP_MARKER: &str = "[download]";

/// What a single output line says about the job
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    /// Percent of the current item, 0-100
    Percent(f32),
    /// Item `index` (1-based) of a `total`-item playlist started
    ItemStarted { index: u32, total: u32 },
    /// Number of items the source expands to
    TotalItems(u32),
    /// One more item is done (downloaded or skipped as already present)
    ItemFinished,
}

/// Classifies one line of downloader output.
pub trait ProgressParser: Send + Sync {
    fn parse(&self, line: &str) -> Option<ProgressEvent>;
}

/// Returns the parser matching a tool's output format.
pub fn parser_for(tool: Tool) -> Box<dyn ProgressParser> {
    match tool {
        Tool::YtDlp => Box::new(YtDlpProgressParser),
        Tool::SpotDl => Box::new(SpotDlProgressParser),
    }
}

/// Parses yt-dlp lines such as
/// `[download]  45.2% of 3.45MiB at 512.00KiB/s ETA 00:05` and
/// `[download] Downloading item 2 of 5`.
#[derive(Debug, Default, Clone, Copy)]
pub struct YtDlpProgressParser;

impl ProgressParser for YtDlpProgressParser {
    fn parse(&self, line: &str) -> Option<ProgressEvent> {
        if !line.contains(YTDLP_MARKER) {
            return None;
        }

        if let Some((_, index, total)) = regex_captures!(r"Downloading (?:item|video) (\d+) of (\d+)", line) {
            let index = index.parse().ok()?;
            let total = total.parse().ok()?;
            return Some(ProgressEvent::ItemStarted { index, total });
        }

        if line.contains('%') {
            return percent_before_sign(line).map(ProgressEvent::Percent);
        }

        None
    }
}

/// Parses spotdl lines such as `Found 12 songs in Album (Album)` and
/// `Downloaded "Artist - Title": https://music.youtube.com/watch?v=...`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpotDlProgressParser;

impl ProgressParser for SpotDlProgressParser {
    fn parse(&self, line: &str) -> Option<ProgressEvent> {
        let line = line.trim();

        if let Some((_, count)) = regex_captures!(r"^Found (\d+) songs? in ", line) {
            return count.parse().ok().map(ProgressEvent::TotalItems);
        }

        if line.starts_with("Downloaded \"") || line.starts_with("Skipping ") {
            return Some(ProgressEvent::ItemFinished);
        }

        if let Some((_, value)) = regex_captures!(r"(\d+(?:\.\d+)?)%", line) {
            return value
                .parse::<f32>()
                .ok()
                .filter(|p| p.is_finite())
                .map(|p| ProgressEvent::Percent(p.clamp(0.0, 100.0)));
        }

        None
    }
}

/// Takes the whitespace-separated token right before the first `%` as a float.
fn percent_before_sign(line: &str) -> Option<f32> {
    let head = line.split('%').next()?;
    let token = head.split_whitespace().last()?;
    let value = token.parse::<f32>().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ytdlp(line: &str) -> Option<ProgressEvent> {
        YtDlpProgressParser.parse(line)
    }

    fn spotdl(line: &str) -> Option<ProgressEvent> {
        SpotDlProgressParser.parse(line)
    }

    #[test]
    fn test_ytdlp_percent_lines() {
        assert_eq!(
            ytdlp("[download]  45.2% of    3.45MiB at  512.00KiB/s ETA 00:05"),
            Some(ProgressEvent::Percent(45.2))
        );
        assert_eq!(
            ytdlp("[download]   0.0% of ~  10.00MiB at  Unknown B/s ETA Unknown (frag 0/12)"),
            Some(ProgressEvent::Percent(0.0))
        );
        assert_eq!(
            ytdlp("[download] 100% of    3.45MiB in 00:00:07 at 498.12KiB/s"),
            Some(ProgressEvent::Percent(100.0))
        );
    }

    #[test]
    fn test_ytdlp_playlist_item_lines() {
        assert_eq!(
            ytdlp("[download] Downloading item 2 of 5"),
            Some(ProgressEvent::ItemStarted { index: 2, total: 5 })
        );
        assert_eq!(
            ytdlp("[download] Downloading video 7 of 12"),
            Some(ProgressEvent::ItemStarted { index: 7, total: 12 })
        );
    }

    #[test]
    fn test_ytdlp_ignores_unrelated_lines() {
        assert_eq!(ytdlp("[youtube] abc123: Downloading webpage"), None);
        assert_eq!(ytdlp("[download] Destination: /music/b/Song.webm"), None);
        assert_eq!(ytdlp("[ExtractAudio] Destination: /music/b/Song.mp3"), None);
        assert_eq!(ytdlp("[download] /music/b/Song.mp3 has already been downloaded"), None);
        assert_eq!(ytdlp("Deleting original file /music/b/Song.webm (pass -k to keep)"), None);
        assert_eq!(ytdlp(""), None);
    }

    #[test]
    fn test_ytdlp_malformed_percent_is_swallowed() {
        assert_eq!(ytdlp("[download] ??% of unknown"), None);
        assert_eq!(ytdlp("[download] %"), None);
        assert_eq!(ytdlp("[download] nan% of 1MiB"), None);
    }

    #[test]
    fn test_ytdlp_percent_is_clamped() {
        assert_eq!(ytdlp("[download] 140.0% of 1MiB"), Some(ProgressEvent::Percent(100.0)));
    }

    #[test]
    fn test_spotdl_lines() {
        assert_eq!(
            spotdl("Found 12 songs in Random Access Memories (Album)"),
            Some(ProgressEvent::TotalItems(12))
        );
        assert_eq!(spotdl("Found 1 song in Get Lucky (Playlist)"), Some(ProgressEvent::TotalItems(1)));
        assert_eq!(
            spotdl("Downloaded \"Daft Punk - Get Lucky\": https://music.youtube.com/watch?v=5NV6Rdv1a3I"),
            Some(ProgressEvent::ItemFinished)
        );
        assert_eq!(
            spotdl("Skipping Daft Punk - Get Lucky (file already exists) (duplicate)"),
            Some(ProgressEvent::ItemFinished)
        );
        assert_eq!(spotdl("  37%|███▋      | 3/8"), Some(ProgressEvent::Percent(37.0)));
    }

    #[test]
    fn test_spotdl_ignores_unrelated_lines() {
        assert_eq!(spotdl("Processing query: https://open.spotify.com/track/abc"), None);
        assert_eq!(spotdl("AudioProviderError: YT-DLP download error"), None);
        assert_eq!(spotdl(""), None);
    }

    #[test]
    fn test_parser_for_tool() {
        assert_eq!(
            parser_for(Tool::YtDlp).parse("[download]  10.0% of 1MiB"),
            Some(ProgressEvent::Percent(10.0))
        );
        assert_eq!(
            parser_for(Tool::SpotDl).parse("Found 3 songs in Mix (Playlist)"),
            Some(ProgressEvent::TotalItems(3))
        );
    }
}
