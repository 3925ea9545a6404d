use clap::Parser;
use std::path::PathBuf;

use crate::config::DEFAULT_RENDERER_PATH;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Document: 0.91\n",
    "Backend:  ", DEFAULT_RENDERER_PATH, " (default)\n",
    "Target:   ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Check, repair and export multitrack edit documents
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Project document to load
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Write a render document (proxies replaced by original media)
    #[arg(value_name = "RENDER_SCRIPT")]
    pub render_script: Option<PathBuf>,

    /// Profile for documents whose profile is unknown (overrides settings)
    #[arg(short = 'p', long = "profile", value_name = "NAME")]
    pub profile: Option<String>,

    /// Apply repairs that need confirmation and save the project
    #[arg(short = 'y', long = "accept-repairs")]
    pub accept_repairs: bool,

    /// Look for missing clips under this folder
    #[arg(short = 's', long = "search", value_name = "DIR")]
    pub search: Option<PathBuf>,

    /// Enable debug logging to file (default: montage.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "montage",
            "film.kdenlive",
            "out.mlt",
            "--profile",
            "atsc_1080p_25",
            "-vv",
            "--log",
            "--accept-repairs",
            "--search",
            "/media",
        ])
        .expect("parse");
        assert_eq!(args.project, PathBuf::from("film.kdenlive"));
        assert_eq!(args.render_script, Some(PathBuf::from("out.mlt")));
        assert_eq!(args.profile.as_deref(), Some("atsc_1080p_25"));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
        assert!(args.accept_repairs);
        assert_eq!(args.search, Some(PathBuf::from("/media")));
    }

    #[test]
    fn test_project_is_required() {
        assert!(Args::try_parse_from(["montage"]).is_err());
    }
}
