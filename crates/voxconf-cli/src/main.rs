//! voxconf CLI - show, query and edit the layered configuration

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use colored::Colorize;
use voxconf_core::ConfigError;
use voxconf_runtime::RuntimeError;
use voxconf_runtime::logging::LoggingBuilder;
use voxconf_runtime::settings::{LogLevel, SettingsLoader};

mod commands;
mod keys;
mod lang;
mod table;

#[derive(Parser)]
#[command(name = "voxconf")]
#[command(version)]
#[command(about = "Small helper tool to quickly show, get or set config values", long_about = None)]
struct Cli {
    /// Resolver settings file (defaults to voxconf.yaml in the working or config directory)
    #[arg(long, global = true)]
    settings: Option<std::path::PathBuf>,

    /// Log resolver activity to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration tables (joined, user, system or remote)
    #[command(group(ArgGroup::new("source").args(["user", "system", "remote"])))]
    Show {
        /// User configuration
        #[arg(short, long)]
        user: bool,

        /// System configuration
        #[arg(short, long)]
        system: bool,

        /// Remote configuration
        #[arg(short, long)]
        remote: bool,

        /// Show a single section; `base` shows the top-level values
        #[arg(long)]
        section: Option<String>,

        /// List the sections of the chosen configuration
        #[arg(short, long)]
        list_sections: bool,
    },

    /// Search for keys in the joined configuration
    ///
    /// A key containing `/` is a strict path from the root (`/tts/module`),
    /// anything else is a case-insensitive search over key names.
    Get {
        /// The key (or parts thereof) to search for
        #[arg(short, long)]
        key: String,
    },

    /// Set a key in the user configuration
    Set {
        /// The key (or parts thereof) to search for
        #[arg(short, long)]
        key: String,

        /// Value to store; prompted for when omitted
        #[arg(short, long)]
        value: Option<String>,
    },

    /// Configure language, speech recognition and voice from recommended presets
    #[command(group(ArgGroup::new("mode").args(["online", "offline", "hybrid"])))]
    #[command(group(ArgGroup::new("voice").args(["male", "female"])))]
    Autoconfigure {
        /// The language code
        #[arg(short, long)]
        lang: String,

        /// Public servers for speech recognition and voice (default)
        #[arg(long)]
        online: bool,

        /// Local plugins for speech recognition and voice
        #[arg(long)]
        offline: bool,

        /// Public servers for speech recognition, local voice
        #[arg(long)]
        hybrid: bool,

        /// Default male voice
        #[arg(short, long)]
        male: bool,

        /// Default female voice
        #[arg(short, long)]
        female: bool,

        /// Merge the presets of a hardware platform
        #[arg(short, long)]
        platform: Option<String>,

        /// Merge GPU accelerated presets
        #[arg(long)]
        gpu: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = SettingsLoader::new();
    if let Some(path) = &cli.settings {
        loader = loader.file(path);
    }
    let settings = loader.load()?;

    let mut logging = settings.logging.clone();
    if !cli.verbose {
        logging.level = LogLevel::Warn;
    }
    LoggingBuilder::from_config(&logging).init();

    let result = match cli.command {
        Commands::Show {
            user,
            system,
            remote,
            section,
            list_sections,
        } => {
            let view = commands::show::View::from_flags(user, system, remote);
            commands::show::execute(&settings, view, section.as_deref(), list_sections)
        }
        Commands::Get { key } => commands::get::execute(&settings, &key),
        Commands::Set { key, value } => commands::set::execute(&settings, &key, value),
        Commands::Autoconfigure {
            lang,
            offline,
            hybrid,
            male,
            female,
            platform,
            gpu,
            ..
        } => {
            let options = commands::autoconfigure::Options {
                lang,
                mode: commands::autoconfigure::Mode::from_flags(offline, hybrid),
                voice: commands::autoconfigure::Voice::from_flags(male, female),
                platform,
                gpu,
            };
            commands::autoconfigure::execute(&settings, &options)
        }
    };
    report(result)
}

/// Turns expected configuration errors into a message and a clean exit.
fn report(result: Result<()>) -> Result<()> {
    let Err(error) = result else {
        return Ok(());
    };
    let config_error = error.downcast_ref::<ConfigError>().or_else(|| {
        match error.downcast_ref::<RuntimeError>() {
            Some(RuntimeError::Config(inner)) => Some(inner),
            _ => None,
        }
    });
    match config_error {
        Some(e) if e.is_permission_denied() || e.is_not_found() => {
            eprintln!("{} {e}", "Error:".red());
            Ok(())
        }
        _ => Err(error),
    }
}
