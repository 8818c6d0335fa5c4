mod app;
mod auth;
mod background;
mod batch;
mod config;
mod error;
mod generation;
mod package;
mod processing;
mod raster;
mod session;
mod state;
mod style;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use app::{ConfigCommand, EditArgs, LoginArgs, RemoteSettings, StyleArgs, UserCommand};
use config::AppConfig;

const API_KEY_ENV: &str = "GOOGLE_API_KEY";
const MODEL_ENV: &str = "PHOTO_CONVERTER_MODEL";

#[derive(Parser)]
#[command(name = "photo-converter", version)]
#[command(about = "Batch photo adjustments and AI style variations")]
#[command(after_help = "\
Environment:
  GOOGLE_API_KEY          API key for the style generator (overrides api_key)
  PHOTO_CONVERTER_MODEL   Generator model name (overrides model)
  RUST_LOG                Log filter, e.g. photo_converter=debug")]
struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    login: LoginArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Adjust photos locally and export the results
    Edit(EditArgs),
    /// Generate style variations with the remote model
    Style(StyleArgs),
    /// List style categories and their variations
    Styles,
    /// Manage accounts in the credential store
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
    /// Show or write the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Environment first, then config file.
fn pick_setting(env_value: Option<String>, configured: Option<&str>) -> Option<String> {
    non_empty(env_value).or_else(|| non_empty(configured.map(str::to_string)))
}

fn resolve_remote(config: &AppConfig) -> RemoteSettings {
    RemoteSettings {
        api_base: non_empty(config.api_base_url.clone())
            .unwrap_or_else(|| generation::DEFAULT_API_BASE.to_string()),
        model: pick_setting(std::env::var(MODEL_ENV).ok(), config.model.as_deref())
            .unwrap_or_else(|| generation::DEFAULT_MODEL.to_string()),
        api_key: pick_setting(std::env::var(API_KEY_ENV).ok(), config.api_key.as_deref()),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Command::Edit(args) => {
            app::login(&config, &cli.login)?;
            app::edit(&config, args)
        }
        Command::Style(args) => {
            app::login(&config, &cli.login)?;
            app::style(&config, &resolve_remote(&config), args)
        }
        Command::Styles => {
            app::list_styles();
            Ok(())
        }
        Command::User { action } => app::user(&config, action),
        Command::Config { action } => app::config(&config, cli.config.as_deref(), action),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn environment_overrides_config() {
        assert_eq!(
            pick_setting(Some("from-env".into()), Some("from-file")),
            Some("from-env".to_string())
        );
        assert_eq!(
            pick_setting(None, Some("from-file")),
            Some("from-file".to_string())
        );
        assert_eq!(
            pick_setting(Some("  ".into()), Some("from-file")),
            Some("from-file".to_string())
        );
        assert_eq!(pick_setting(None, Some("")), None);
    }

    #[test]
    fn remote_settings_fall_back_to_defaults() {
        let config = AppConfig {
            api_base_url: Some("http://localhost:8080/v1beta".into()),
            ..AppConfig::default()
        };
        let remote = resolve_remote(&config);
        assert_eq!(remote.api_base, "http://localhost:8080/v1beta");
        if std::env::var(MODEL_ENV).is_err() {
            assert_eq!(remote.model, generation::DEFAULT_MODEL);
        }
    }

    #[test]
    fn style_flags_parse() {
        let cli = Cli::try_parse_from([
            "photo-converter",
            "--user",
            "ana",
            "--password",
            "pw",
            "style",
            "me.jpg",
            "--category",
            "vintage",
            "--variation",
            "Polaroid",
            "--preserve-age",
            "--skin-tone",
            "warmer",
            "--zip",
            "out.zip",
        ])
        .unwrap();
        assert_eq!(cli.login.user.as_deref(), Some("ana"));
        let Command::Style(args) = cli.command else {
            panic!("expected style command");
        };
        assert_eq!(args.category, style::StyleCategory::Vintage);
        assert_eq!(args.variations, ["Polaroid"]);
        assert!(args.preserve_age);
        assert_eq!(args.enhance.skin_tone, style::SkinTone::Warmer);
    }

    #[test]
    fn preserve_and_target_age_conflict() {
        let result = Cli::try_parse_from([
            "photo-converter",
            "style",
            "me.jpg",
            "--category",
            "modern",
            "--preserve-age",
            "--target-age",
            "30-35",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn reset_cannot_be_combined_with_preview() {
        let result = Cli::try_parse_from([
            "photo-converter",
            "edit",
            "a.jpg",
            "b.jpg",
            "--preview",
            "--reset",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn negative_rotation_is_accepted() {
        let cli =
            Cli::try_parse_from(["photo-converter", "edit", "a.jpg", "--rotate", "-15"]).unwrap();
        let Command::Edit(args) = cli.command else {
            panic!("expected edit command");
        };
        assert_eq!(args.adjust.rotate, Some(-15.0));
    }
}
