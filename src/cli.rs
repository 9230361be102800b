use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "stamp", version, about = "Prepend a license banner to source trees")]
pub struct Cli {
    /// Change to this directory before doing anything else.
    #[arg(short = 'C', long = "chdir")]
    pub chdir: Option<PathBuf>,
    /// Explicit config file path; skips discovery.
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,
    #[arg(short = 'n', long = "dry-run", global = true)]
    pub dry_run: bool,
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stamp the banner onto every file under the target directory.
    Apply(ApplyArgs),
    /// Report files whose content does not begin with the banner.
    Check(CheckArgs),
    /// Print the resolved banner text.
    Banner(BannerArgs),
    /// Configuration display, validation, and template generation.
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommand>,
    },
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Directory to process; overrides the configured target.
    #[arg()]
    pub dir: Option<PathBuf>,
    /// Read the banner from this file instead of the config.
    #[arg(long = "banner-file")]
    pub banner_file: Option<PathBuf>,
    /// Skip files that are not valid UTF-8 instead of decoding lossily.
    #[arg(long = "strict")]
    pub strict: bool,
    /// Leave files alone when they already start with the banner.
    #[arg(long = "skip-stamped")]
    pub skip_stamped: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg()]
    pub dir: Option<PathBuf>,
    #[arg(long = "banner-file")]
    pub banner_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BannerArgs {
    #[arg(long = "banner-file")]
    pub banner_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    Path,
    Check,
    Generate {
        #[arg()]
        path: Option<PathBuf>,
        #[arg(long = "force", default_value_t = false)]
        force: bool,
    },
    /// Set the default target directory in the config.
    SetTarget { dir: String },
    /// Point the config's banner at a file, replacing any inline text.
    SetBannerFile { path: String },
}

/// Helper entry point so `main` can stay minimal.
pub fn parse() -> Cli {
    Cli::parse()
}
