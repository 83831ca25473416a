//! Définition et implémentation des commandes CLI
//!
//! - `resolve`: point → parcelle (résumé + export GeoJSON optionnel)
//! - `search`: adresse → lieu → parcelle
//! - `context`: résumé de contexte tel qu'envoyé à l'assistant
//! - `chat`: session interactive carte + assistant

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use parcel_assistant::conversation::SessionError;
use parcel_assistant::export::export_frame;
use parcel_assistant::map::{MapEvent, MapRenderer, MapSnapshot, TraceRenderer, ViewState};
use parcel_assistant::{App, Config, Credentials, SessionStatus};
use parcel_lookup::LngLat;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the parcel under a point
    Resolve {
        /// Latitude (WGS84)
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude (WGS84)
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Write the map (parcel + marker) to a GeoJSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search an address, then resolve the parcel at the result
    Search {
        /// Free-text address
        address: String,

        /// Write the map (parcel + marker) to a GeoJSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the context summary sent to the assistant for a point
    Context {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Interactive session: map commands and questions to the assistant
    Chat {
        /// Initial selection latitude
        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,

        /// Initial selection longitude
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
    },
}

/// Construit l'application depuis la config (preset ou fichier) et l'environnement
pub fn build_app(config: &str) -> Result<App> {
    let config = Config::resolve(config)?;
    App::new(config, Credentials::from_env())
}

/// Résout la parcelle sous un point
pub async fn cmd_resolve(app: &App, lat: f64, lon: f64, output: Option<&Path>) -> Result<()> {
    let point = LngLat::new(lon, lat)?;
    app.map.select_point(point).await;

    print_selection(app);
    if let Some(output) = output {
        export_map(app, output)?;
    }
    Ok(())
}

/// Recherche une adresse puis résout sa parcelle
pub async fn cmd_search(app: &App, address: &str, output: Option<&Path>) -> Result<()> {
    let Some(place) = app.goto_address(address).await? else {
        println!("No result for '{}'", address);
        return Ok(());
    };

    println!("Place: {} ({})", place.label, place.location);
    print_selection(app);
    if let Some(output) = output {
        export_map(app, output)?;
    }
    Ok(())
}

/// Affiche le résumé de contexte pour un point
pub async fn cmd_context(app: &App, lat: f64, lon: f64) -> Result<()> {
    let point = LngLat::new(lon, lat)?;
    app.map.select_point(point).await;

    match app.map.context() {
        Some(summary) => println!("{}", summary),
        None => println!("(no context)"),
    }
    Ok(())
}

/// Commande saisie dans la session interactive
#[derive(Debug, Clone, PartialEq)]
enum ChatCommand {
    Ask(String),
    Click(LngLat),
    Goto(String),
    Pan(ViewState),
    Clear,
    Reset,
    Dismiss,
    Map,
    Export(PathBuf),
    Help,
    Quit,
    Invalid(String),
}

const HELP: &str = "\
Commands:
  /click <lat> <lon>       select the parcel under a point
  /goto <address>          search an address and recenter on it
  /pan <lat> <lon> [zoom]  move the map without changing the selection
  /clear                   clear the selection
  /reset                   clear the conversation
  /dismiss                 dismiss the last error
  /map                     show the current map state
  /export <file>           write the map to GeoJSON
  /quit                    leave
Anything else is sent to the assistant.";

fn parse_command(line: &str) -> Option<ChatCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ChatCommand::Ask(line.to_string()));
    };

    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let command = match name {
        "click" => match parse_numbers(args).as_deref() {
            Some([lat, lon]) => match LngLat::new(*lon, *lat) {
                Ok(point) => ChatCommand::Click(point),
                Err(e) => ChatCommand::Invalid(e.to_string()),
            },
            _ => ChatCommand::Invalid("usage: /click <lat> <lon>".into()),
        },
        "pan" => match parse_numbers(args).as_deref() {
            Some([lat, lon]) => {
                ChatCommand::Pan(ViewState::new(*lon, *lat, ViewState::WORLD.zoom))
            }
            Some([lat, lon, zoom]) => ChatCommand::Pan(ViewState::new(*lon, *lat, *zoom)),
            _ => ChatCommand::Invalid("usage: /pan <lat> <lon> [zoom]".into()),
        },
        "goto" if !args.is_empty() => ChatCommand::Goto(args.to_string()),
        "goto" => ChatCommand::Invalid("usage: /goto <address>".into()),
        "export" if !args.is_empty() => ChatCommand::Export(PathBuf::from(args)),
        "export" => ChatCommand::Invalid("usage: /export <file>".into()),
        "clear" => ChatCommand::Clear,
        "reset" => ChatCommand::Reset,
        "dismiss" => ChatCommand::Dismiss,
        "map" => ChatCommand::Map,
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        other => ChatCommand::Invalid(format!("unknown command /{} (try /help)", other)),
    };
    Some(command)
}

fn parse_numbers(args: &str) -> Option<Vec<f64>> {
    args.split_whitespace()
        .map(|s| s.trim_end_matches(',').parse::<f64>().ok())
        .collect()
}

/// Session interactive
pub async fn cmd_chat(app: &App, start: Option<LngLat>) -> Result<()> {
    for notice in app.notices() {
        println!("! {}", notice);
    }
    if let Some(session) = app.session() {
        println!("Assistant model: {}", session.model());
    }
    println!("Type /help for commands.");

    let mut renderer = TraceRenderer::default();
    let mut revisions = app.map.subscribe();

    if let Some(point) = start {
        app.map.handle_event(MapEvent::Click(point)).await;
        print_selection(app);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(app);
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Invalid(message) => println!("{}", message),
            ChatCommand::Click(point) => {
                app.map.handle_event(MapEvent::Click(point)).await;
                print_selection(app);
            }
            ChatCommand::Pan(view) => {
                let ticket = app.map.snapshot().gesture;
                app.map.handle_event(MapEvent::Move { view, ticket }).await;
            }
            ChatCommand::Goto(address) => match app.goto_address(&address).await {
                Ok(Some(place)) => {
                    println!("Place: {} ({})", place.label, place.location);
                    print_selection(app);
                }
                Ok(None) => println!("No result for '{}'", address),
                Err(e) => println!("{}", e),
            },
            ChatCommand::Clear => app.map.clear_selection(),
            ChatCommand::Reset => match app.session().map(|s| s.reset()) {
                Some(Ok(())) => println!("Conversation cleared"),
                Some(Err(e)) => println!("{}", e),
                None => println!("Assistant is not configured"),
            },
            ChatCommand::Dismiss => {
                if let Some(session) = app.session() {
                    session.dismiss_error();
                }
            }
            ChatCommand::Map => {
                print_selection(app);
                if let Some(url) = app.preview_url() {
                    println!("Preview: {}", url);
                }
            }
            ChatCommand::Export(path) => {
                if let Err(e) = export_map(app, &path) {
                    println!("{:#}", e);
                }
            }
            ChatCommand::Ask(text) => match app.ask(&text).await {
                Ok(turn) => println!("\n{}\n", turn.text),
                Err(e) => match e.downcast_ref::<SessionError>() {
                    Some(SessionError::Backend(message)) => {
                        println!("Error: {} (/dismiss to hide)", message)
                    }
                    _ => println!("{}", e),
                },
            },
        }

        // Un rendu par révision de l'état de carte
        if revisions.has_changed().unwrap_or(false) {
            revisions.borrow_and_update();
            let snapshot = app.map.snapshot();
            renderer.render(&snapshot.frame(&app.config.style));
        }
    }

    info!(frames = renderer.frames(), "Session ended");
    Ok(())
}

fn prompt(app: &App) {
    let marker = match app.session().map(|s| s.status()) {
        Some(SessionStatus::Error) => "!> ",
        _ => "> ",
    };
    print!("{}", marker);
    if let Err(e) = std::io::stdout().flush() {
        warn!(error = %e, "Failed to flush stdout");
    }
}

fn print_selection(app: &App) {
    for line in describe_selection(&app.map.snapshot()) {
        println!("{}", line);
    }
}

/// Lignes affichées pour l'état courant de la carte
fn describe_selection(snapshot: &MapSnapshot) -> Vec<String> {
    let view = snapshot.view;
    let mut lines = vec![format!(
        "View: {:.6},{:.6} zoom {:.1}",
        view.latitude, view.longitude, view.zoom
    )];

    let Some(marker) = snapshot.marker else {
        lines.push("No selection".to_string());
        return lines;
    };
    lines.push(format!("Marker: {}", marker));

    match &snapshot.parcel {
        Some(parcel) => {
            lines.push(format!("Parcel: {}", parcel.id));
            lines.push(format!(
                "  {} feature(s), type {}",
                parcel.feature_count(),
                parcel.primary_geometry_type().unwrap_or("unknown")
            ));
            if let Some(centroid) = parcel.centroid() {
                lines.push(format!("  centroid: {:.6},{:.6}", centroid.y(), centroid.x()));
            }
            if let Some(rect) = parcel.bounding_rect() {
                lines.push(format!(
                    "  bbox: {:.6},{:.6},{:.6},{:.6}",
                    rect.min().x,
                    rect.min().y,
                    rect.max().x,
                    rect.max().y
                ));
            }
        }
        None if snapshot.pending.is_some() => lines.push("Parcel: resolving...".to_string()),
        None => lines.push("Parcel: none found".to_string()),
    }
    lines
}

fn export_map(app: &App, output: &Path) -> Result<()> {
    let snapshot = app.map.snapshot();
    let written = export_frame(&snapshot.frame(&app.config.style), output)?;
    println!("Wrote {} feature(s) to {}", written, output.display());
    Ok(())
}
