use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};

use crate::banner::Banner;
use crate::cli::{ApplyArgs, BannerArgs, CheckArgs, Cli, Command, ConfigCommand};
use crate::config::{self, BannerConfig, StampConfig};
use crate::stamper::{self, StampOptions};

const CONFIG_DIR: &str = ".stamp";
const CONFIG_FILENAME: &str = "config.toml";
const BARE_CONFIG_FILENAME: &str = "stamp.toml";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConfigPathSource {
    Explicit,
    Discovered,
    HomeDefault,
}

impl ConfigPathSource {
    fn as_str(&self) -> &'static str {
        match self {
            ConfigPathSource::Explicit => "explicit",
            ConfigPathSource::Discovered => "discovered",
            ConfigPathSource::HomeDefault => "home-default",
        }
    }
}

#[derive(Clone, Debug)]
struct ResolvedConfigPath {
    path: Utf8PathBuf,
    source: ConfigPathSource,
}

pub fn run(cli: Cli) -> Result<()> {
    let ctx = CliContext::from(&cli);
    ctx.apply_chdir()?;

    match cli.command {
        Command::Config { command } => handle_config_only(&ctx, command),
        other => {
            let state = AppState::new(ctx)?;
            match other {
                Command::Apply(args) => handle_apply(&state, args),
                Command::Check(args) => handle_check(&state, args),
                Command::Banner(args) => handle_banner(&state, args),
                Command::Config { .. } => unreachable!("config commands handled earlier"),
            }
        }
    }
}

fn handle_apply(state: &AppState, args: ApplyArgs) -> Result<()> {
    let target = state.resolve_target(args.dir)?;
    let banner = state.resolve_banner(args.banner_file)?;

    let opts = StampOptions {
        policy: if args.strict {
            stamper::DecodePolicy::Strict
        } else {
            state.config.decode.unwrap_or_default()
        },
        skip_stamped: args.skip_stamped || state.config.skip_stamped,
        dry_run: state.ctx.dry_run,
    };

    let outcome = stamper::stamp_tree(&target, &banner, &opts)?;

    for skip in &outcome.skipped {
        println!(
            "[warn] skipping {} due to decoding error: {}",
            skip.path, skip.reason
        );
    }

    if !outcome.already_stamped.is_empty() {
        println!(
            "{} files already start with the banner; left untouched.",
            outcome.already_stamped.len()
        );
    }

    if state.ctx.dry_run {
        println!(
            "[dry-run] would stamp {} files under {}",
            outcome.stamped.len(),
            target
        );
    } else {
        println!("Stamped {} files under {}", outcome.stamped.len(), target);
    }
    Ok(())
}

fn handle_check(state: &AppState, args: CheckArgs) -> Result<()> {
    let target = state.resolve_target(args.dir)?;
    let banner = state.resolve_banner(args.banner_file)?;

    let outcome = stamper::check_tree(&target, &banner)?;

    if outcome.missing.is_empty() {
        println!(
            "[ok] all {} files under {} start with the banner.",
            outcome.scanned, target
        );
        return Ok(());
    }

    println!("Files missing the banner under {}:", target);
    for path in &outcome.missing {
        println!("  - {}", path);
    }
    bail!(
        "{} of {} files are missing the banner",
        outcome.missing.len(),
        outcome.scanned
    )
}

fn handle_banner(state: &AppState, args: BannerArgs) -> Result<()> {
    let banner = state.resolve_banner(args.banner_file)?;
    print!("{}", banner.text());
    Ok(())
}

fn handle_config_only(ctx: &CliContext, command: Option<ConfigCommand>) -> Result<()> {
    let resolved = ctx.resolve_config_path()?;
    let config_path = resolved.path;
    match command {
        Some(ConfigCommand::Path) => {
            println!("Config path: {} ({})", config_path, resolved.source.as_str());
            Ok(())
        }
        None | Some(ConfigCommand::Show) => {
            if !config_path.exists() {
                println!("No config found at {}.", config_path);
                println!("Use `stamp config generate` to scaffold a default configuration.");
                return Ok(());
            }

            let config = config::load_from_path(&config_path)?;
            println!("Config path: {} ({})", config_path, resolved.source.as_str());
            print!("{}", config::format_summary(&config));
            Ok(())
        }
        Some(ConfigCommand::Check) => {
            let config = config::load_from_path(&config_path)?;
            println!("Config OK: {} ({})", config_path, resolved.source.as_str());
            print!("{}", config::format_summary(&config));
            Ok(())
        }
        Some(ConfigCommand::Generate { path, force }) => {
            let target = match path {
                Some(path) => utf8_path(path, "config generate path")?,
                None => config_path.clone(),
            };
            config::write_example_config(&target, force)?;
            if force {
                println!("Overwrote config at {}", target);
            } else {
                println!("Wrote example config to {}", target);
            }
            Ok(())
        }
        Some(ConfigCommand::SetTarget { dir }) => {
            config::set_target(&config_path, &dir)?;
            println!(
                "Target directory set to `{}` in {} ({})",
                dir,
                config_path,
                resolved.source.as_str()
            );
            Ok(())
        }
        Some(ConfigCommand::SetBannerFile { path }) => {
            config::set_banner_file(&config_path, &path)?;
            println!(
                "Banner file set to `{}` in {} ({})",
                path,
                config_path,
                resolved.source.as_str()
            );
            Ok(())
        }
    }
}

#[derive(Clone, Debug)]
struct CliContext {
    chdir: Option<PathBuf>,
    file: Option<PathBuf>,
    dry_run: bool,
}

impl From<&Cli> for CliContext {
    fn from(cli: &Cli) -> Self {
        Self {
            chdir: cli.chdir.clone(),
            file: cli.file.clone(),
            dry_run: cli.dry_run,
        }
    }
}

impl CliContext {
    fn apply_chdir(&self) -> Result<()> {
        if let Some(path) = &self.chdir {
            std::env::set_current_dir(path)
                .with_context(|| format!("changing directory to {}", path.display()))?;
        }
        Ok(())
    }

    fn resolve_config_path(&self) -> Result<ResolvedConfigPath> {
        if let Some(path) = &self.file {
            return Ok(ResolvedConfigPath {
                path: utf8_path(path.clone(), "config path")?,
                source: ConfigPathSource::Explicit,
            });
        }

        if let Ok(cwd) = std::env::current_dir() {
            if let Ok(cwd) = Utf8PathBuf::from_path_buf(cwd) {
                if let Some(path) = discover_config(&cwd) {
                    return Ok(ResolvedConfigPath {
                        path,
                        source: ConfigPathSource::Discovered,
                    });
                }
            }
        }

        let home = dirs::home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
        let mut path = home;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILENAME);
        Ok(ResolvedConfigPath {
            path: utf8_path(path, "config path")?,
            source: ConfigPathSource::HomeDefault,
        })
    }
}

/// Walk up from `start` looking for `.stamp/config.toml` or a bare
/// `stamp.toml` at each level, nearest match first.
fn discover_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut dir = start;
    loop {
        let preferred = dir.join(CONFIG_DIR).join(CONFIG_FILENAME);
        if preferred.exists() {
            return Some(preferred);
        }

        let bare = dir.join(BARE_CONFIG_FILENAME);
        if bare.exists() {
            return Some(bare);
        }

        dir = dir.parent()?;
    }
}

struct AppState {
    ctx: CliContext,
    config_path: Utf8PathBuf,
    config: StampConfig,
}

impl AppState {
    fn new(ctx: CliContext) -> Result<Self> {
        let resolved = ctx.resolve_config_path()?;
        let config_path = resolved.path;
        // Config is optional for apply/check: the target and banner can both
        // come from the command line.
        let config = if config_path.exists() {
            config::load_from_path(&config_path)?
        } else {
            StampConfig::default()
        };

        Ok(Self {
            ctx,
            config_path,
            config,
        })
    }

    fn resolve_target(&self, dir: Option<PathBuf>) -> Result<Utf8PathBuf> {
        let target = match dir {
            Some(dir) => utf8_path(dir, "target directory")?,
            None => match &self.config.target {
                Some(target) => Utf8PathBuf::from(target),
                None => bail!(
                    "no target directory; pass one to the command or set `target` in the config"
                ),
            },
        };

        if !target.is_dir() {
            bail!("target directory {} does not exist", target);
        }
        Ok(target)
    }

    fn resolve_banner(&self, banner_file: Option<PathBuf>) -> Result<Banner> {
        if let Some(path) = banner_file {
            return Banner::load(&utf8_path(path, "banner file")?);
        }

        match &self.config.banner {
            Some(BannerConfig {
                text: Some(text), ..
            }) => Ok(Banner::from_text(text)),
            Some(BannerConfig {
                file: Some(file), ..
            }) => Banner::load(&self.config_relative(file)),
            _ => bail!(
                "no banner configured; pass --banner-file or run `stamp config generate` \
                 and fill in the [banner] table"
            ),
        }
    }

    /// Relative banner paths resolve against the config file's directory,
    /// so `file = "HEADER.txt"` works from anywhere in the tree.
    fn config_relative(&self, path: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from(path);
        if path.is_absolute() {
            return path;
        }
        match self.config_path.parent() {
            Some(parent) => parent.join(path),
            None => path,
        }
    }
}

fn utf8_path(path: PathBuf, what: &str) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| anyhow!("{} {} is not valid UTF-8", what, p.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> Utf8PathBuf {
        let mut dir = std::env::temp_dir();
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("stamp-runner-test-{ts}"));
        let dir = Utf8PathBuf::from_path_buf(dir).unwrap();
        fs::create_dir_all(dir.as_std_path()).unwrap();
        dir
    }

    fn context() -> CliContext {
        CliContext {
            chdir: None,
            file: None,
            dry_run: false,
        }
    }

    #[test]
    fn discover_prefers_nearest_dotdir_config() {
        let root = unique_temp_dir();
        let nested = root.join("a").join("b");
        fs::create_dir_all(nested.as_std_path()).unwrap();
        fs::create_dir_all(root.join(CONFIG_DIR).as_std_path()).unwrap();
        let cfg = root.join(CONFIG_DIR).join(CONFIG_FILENAME);
        fs::write(cfg.as_std_path(), "target = 'lib'\n").unwrap();

        assert_eq!(discover_config(&nested), Some(cfg));

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn discover_falls_back_to_bare_config() {
        let root = unique_temp_dir();
        let nested = root.join("a");
        fs::create_dir_all(nested.as_std_path()).unwrap();
        let cfg = root.join(BARE_CONFIG_FILENAME);
        fs::write(cfg.as_std_path(), "target = 'lib'\n").unwrap();

        assert_eq!(discover_config(&nested), Some(cfg));

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn resolve_config_prefers_explicit_file() {
        let root = unique_temp_dir();
        let cfg = root.join("explicit.toml");
        fs::write(cfg.as_std_path(), "target = 'lib'\n").unwrap();

        let mut ctx = context();
        ctx.file = Some(cfg.as_std_path().to_path_buf());
        let resolved = ctx.resolve_config_path().unwrap();
        assert_eq!(resolved.source, ConfigPathSource::Explicit);
        assert!(resolved.path.ends_with("explicit.toml"));

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn banner_file_resolves_relative_to_config() {
        let root = unique_temp_dir();
        let cfg_dir = root.join(CONFIG_DIR);
        fs::create_dir_all(cfg_dir.as_std_path()).unwrap();
        let cfg = cfg_dir.join(CONFIG_FILENAME);
        fs::write(cfg.as_std_path(), "[banner]\nfile = 'HEADER.txt'\n").unwrap();
        fs::write(cfg_dir.join("HEADER.txt").as_std_path(), "H\n").unwrap();

        let state = AppState {
            ctx: context(),
            config_path: cfg.clone(),
            config: config::load_from_path(&cfg).unwrap(),
        };
        let banner = state.resolve_banner(None).unwrap();
        assert_eq!(banner.text(), "H\n");

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn apply_stamps_target_from_cli_arguments() {
        let root = unique_temp_dir();
        let tree = root.join("tree");
        fs::create_dir_all(tree.join("sub").as_std_path()).unwrap();
        fs::write(tree.join("a.txt").as_std_path(), "alpha").unwrap();
        fs::write(tree.join("sub").join("b.txt").as_std_path(), "beta").unwrap();
        let header = root.join("HEADER.txt");
        fs::write(header.as_std_path(), "X\n").unwrap();

        let state = AppState {
            ctx: context(),
            config_path: root.join(CONFIG_DIR).join(CONFIG_FILENAME),
            config: StampConfig::default(),
        };
        handle_apply(
            &state,
            ApplyArgs {
                dir: Some(tree.as_std_path().to_path_buf()),
                banner_file: Some(header.as_std_path().to_path_buf()),
                strict: false,
                skip_stamped: false,
            },
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(tree.join("a.txt").as_std_path()).unwrap(),
            "X\nalpha"
        );
        assert_eq!(
            fs::read_to_string(tree.join("sub").join("b.txt").as_std_path()).unwrap(),
            "X\nbeta"
        );

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn check_fails_when_banner_is_missing() {
        let root = unique_temp_dir();
        let tree = root.join("tree");
        fs::create_dir_all(tree.as_std_path()).unwrap();
        fs::write(tree.join("a.txt").as_std_path(), "alpha").unwrap();
        let header = root.join("HEADER.txt");
        fs::write(header.as_std_path(), "X\n").unwrap();

        let state = AppState {
            ctx: context(),
            config_path: root.join(CONFIG_DIR).join(CONFIG_FILENAME),
            config: StampConfig::default(),
        };
        let result = handle_check(
            &state,
            CheckArgs {
                dir: Some(tree.as_std_path().to_path_buf()),
                banner_file: Some(header.as_std_path().to_path_buf()),
            },
        );
        assert!(result.is_err());

        let _ = fs::remove_dir_all(root.as_std_path());
    }

    #[test]
    fn missing_target_is_reported() {
        let state = AppState {
            ctx: context(),
            config_path: Utf8PathBuf::from("unused.toml"),
            config: StampConfig::default(),
        };
        let err = state.resolve_target(None).unwrap_err();
        assert!(err.to_string().contains("no target directory"));
    }
}
