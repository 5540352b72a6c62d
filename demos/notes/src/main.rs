//! Notes: a small REST service showing every part of faster-app.
//!
//! ```text
//! notes serve --config demos/notes/notes.toml
//! notes token ada --admin
//! notes routes
//! ```

mod notes;
mod services;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use faster_app::auth::authentication::codec_from_settings;
use faster_app::core::settings_loader;
use faster_app::prelude::*;

use crate::notes::NoteViewSet;

#[derive(Debug, Parser)]
#[command(name = "notes", version, about = "Demo notes service")]
struct Cli {
    /// TOML settings file; environment overrides still apply.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the API (the default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print a bearer token for a user id.
    Token {
        user: String,
        #[arg(long)]
        admin: bool,
    },
    /// List the routes the service would register.
    Routes,
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => settings_loader::from_toml_file_with_env(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(settings_loader::from_env()),
    }
}

fn app(settings: Settings) -> anyhow::Result<FasterApp> {
    let registry = services::registry().context("registering applications")?;
    Ok(FasterApp::new(settings)
        .registry(registry)
        .router(NoteViewSet::router("/notes").tags(["notes"])))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            app(settings)?.run().await.context("server failed")?;
        }
        Command::Token { user, admin } => {
            let codec = codec_from_settings(&settings);
            let token = codec
                .issue(&user, json!({ "is_admin": admin }), settings.jwt.access_token_expire_minutes)
                .context("issuing token")?;
            println!("{token}");
        }
        Command::Routes => {
            let table = app(settings)?.route_table().context("building routes")?;
            for entry in table.entries() {
                let methods: Vec<&str> = entry.methods.iter().map(|m| m.as_str()).collect();
                println!(
                    "{:<18} {:<28} {:<24} {}",
                    methods.join(","),
                    entry.pattern.route(),
                    entry.name.as_deref().unwrap_or("-"),
                    entry.source
                );
            }
        }
    }
    Ok(())
}
