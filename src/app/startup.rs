//! Application startup and command dispatch

use super::cli::args::{Args, Command};
use super::serve;
use crate::core::logging::init_logging;
use crate::core::version::version_line;
use crate::plugin::api::{log_plugin_error_with_context, PluginError, PluginManager, PluginManifest};
use clap::Parser;
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;

/// Exit code for bad arguments or configuration
const EXIT_USAGE: i32 = 2;

/// Initialize application startup and run the selected command
///
/// Returns the process exit code.
pub async fn startup() -> i32 {
    let mut args = Args::parse();

    // Logging is not up yet, so configuration problems go straight to stderr
    let config_path = match args.apply_config_file().await {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };

    let use_color = args.use_color();
    colored::control::set_override(use_color);
    let log_file = args.log_file_str();
    if let Err(e) = init_logging(
        args.log_level.as_deref(),
        args.log_format.as_deref(),
        log_file.as_deref(),
        use_color,
    ) {
        eprintln!("Failed to initialise logging: {e}");
        return EXIT_USAGE;
    }

    log::info!("plughost {}", version_line());
    if let Some(path) = config_path {
        log::debug!("Loaded configuration from {}", path.display());
    }

    let manager = Arc::new(PluginManager::new(args.host_settings()));
    match args.command() {
        Command::List { json } => list(&manager, json).await,
        Command::Invoke {
            plugin_id,
            method,
            args,
        } => invoke(&manager, &plugin_id, &method, &args).await,
        Command::Renderer { plugin_id } => renderer(&manager, &plugin_id).await,
        Command::Serve => serve_stdio(manager).await,
    }
}

async fn list(manager: &PluginManager, as_json: bool) -> i32 {
    manager.load_all().await;
    let manifests = manager.list().await;

    if as_json {
        return match serde_json::to_string_pretty(&manifests) {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(e) => {
                log::error!("Could not serialise plugin list: {e}");
                1
            }
        };
    }

    if manifests.is_empty() {
        println!(
            "No plugins found in {}",
            manager.settings().plugins_dir.display()
        );
        return 0;
    }
    for line in format_manifests(&manifests) {
        println!("{line}");
    }
    0
}

/// One aligned line per manifest
fn format_manifests(manifests: &[PluginManifest]) -> Vec<String> {
    let id_width = manifests.iter().map(|m| m.id.len()).max().unwrap_or(0);
    let version_width = manifests.iter().map(|m| m.version.len()).max().unwrap_or(0);

    manifests
        .iter()
        .map(|manifest| {
            let state = if manifest.enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            format!(
                "{:<id_width$}  {:<version_width$}  {:<8}  {}",
                manifest.id.bold(),
                manifest.version,
                state,
                manifest.name
            )
        })
        .collect()
}

/// Command line argument as JSON, or a plain string when it does not parse
fn parse_argument(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn invoke(manager: &PluginManager, plugin_id: &str, method: &str, raw_args: &[String]) -> i32 {
    manager.start().await;

    if !manager.registry().is_active(plugin_id).await {
        match manager.activate(plugin_id).await {
            Ok(_) => {}
            // Unknown ids are reported by the envelope below
            Err(PluginError::NotFound { .. }) => {}
            Err(e) => log_plugin_error_with_context(&e, "Activating plugin"),
        }
    }

    let args = raw_args.iter().map(|raw| parse_argument(raw)).collect();
    let envelope = manager.invoke(plugin_id, method, args).await;
    match serde_json::to_string(&envelope) {
        Ok(text) => println!("{text}"),
        Err(e) => log::error!("Could not serialise invocation result: {e}"),
    }

    manager.shutdown().await;
    if envelope.is_success() {
        0
    } else {
        1
    }
}

async fn renderer(manager: &PluginManager, plugin_id: &str) -> i32 {
    manager.load_all().await;
    match manager.get_renderer_location(plugin_id).await {
        Some(location) => {
            println!("{location}");
            0
        }
        None => {
            log::error!("Plugin {plugin_id} is unknown or has no renderer entry");
            1
        }
    }
}

async fn serve_stdio(manager: Arc<PluginManager>) -> i32 {
    let (_, activation) = manager.start().await;
    log::info!(
        "{} plugins active, {} failed to activate",
        activation.activated.len(),
        activation.failed.len()
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let result = tokio::select! {
        result = serve::serve(Arc::clone(&manager), stdin, stdout) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    manager.shutdown().await;
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::error!("Line protocol failed: {e}");
            1
        }
    }
}
