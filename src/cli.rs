use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "melodrop")]
#[command(author, version, about = "Download-job tracker for yt-dlp and spotdl", long_about = None)]
pub struct Cli {
    /// Config file (defaults to ./melodrop.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Root directory for downloads
        #[arg(short, long)]
        download_dir: Option<String>,
    },

    /// Download URLs in the foreground and print the results
    Download {
        /// Music URLs (YouTube, SoundCloud, Spotify)
        #[arg(required = true)]
        urls: Vec<String>,

        /// Root directory for downloads
        #[arg(short, long)]
        download_dir: Option<String>,
    },

    /// Estimate how many tracks the URLs expand to
    Count {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Print the `access_secret_hash` value for a secret
    HashSecret { secret: String },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
