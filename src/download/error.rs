use std::fmt;

/// Structured error type for external tool invocations.
///
/// The message of every variant is what ends up in a failed job's `error` field,
/// so it is always non-empty and human-readable.
#[derive(Debug)]
pub enum DownloadError {
    /// The tool binary could not be started (missing, not executable)
    Spawn(String),
    /// The tool ran and exited with a non-zero status
    Exit(String),
    /// A bounded invocation (track counting) ran past its deadline
    Timeout(String),
    /// Pipe or filesystem failure while talking to the process
    Io(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for DownloadError {}

impl DownloadError {
    /// Returns subcategory for log fields
    pub fn subcategory(&self) -> &'static str {
        match self {
            DownloadError::Spawn(_) => "spawn",
            DownloadError::Exit(_) => "exit",
            DownloadError::Timeout(_) => "timeout",
            DownloadError::Io(_) => "io",
        }
    }

    /// Returns the inner message
    pub fn message(&self) -> &str {
        match self {
            DownloadError::Spawn(msg) | DownloadError::Exit(msg) | DownloadError::Timeout(msg) | DownloadError::Io(msg) => {
                msg
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_display() {
        let err = DownloadError::Exit("ERROR: Unsupported URL".into());
        assert_eq!(err.to_string(), "ERROR: Unsupported URL");
    }

    #[test]
    fn test_download_error_subcategory() {
        assert_eq!(DownloadError::Spawn("".into()).subcategory(), "spawn");
        assert_eq!(DownloadError::Exit("".into()).subcategory(), "exit");
        assert_eq!(DownloadError::Timeout("".into()).subcategory(), "timeout");
        assert_eq!(DownloadError::Io("".into()).subcategory(), "io");
    }
}
