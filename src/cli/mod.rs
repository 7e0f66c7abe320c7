//! Command-line interface for PM33 Connect
//!
//! Drives the same [`ConnectService`] the HTTP server uses, so a connection
//! can be started with `pm33 connect` and completed with `pm33 callback`.

use crate::auth::RedirectInstruction;
use crate::config::{Config, HttpConfig};
use crate::http::InstructionView;
use crate::model::IntegrationSummary;
use crate::service::ConnectService;
use crate::{ConnectError, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(crate::constants::CONFIG_FILE_NAME);
    let config = Config::load_from_path(config_path)?;

    crate::init_logging_with(config.log.as_ref().and_then(|l| l.level.as_deref()));

    match matches.subcommand() {
        Some(("serve", sub)) => handle_serve_command(config, sub).await,
        Some(("providers", sub)) => {
            let service = ConnectService::from_config(&config).await?;
            let providers = service.providers();
            if sub.get_flag("json") {
                print_json(&providers)
            } else {
                println!("\nProviders:");
                for p in providers {
                    println!("  {:<8} {:<10} {}", p.id.as_str(), p.mode.as_str(), p.name);
                }
                Ok(())
            }
        }
        Some(("connect", sub)) => {
            let provider = required_arg(sub, "provider")?;
            let service = ConnectService::from_config(&config).await?;
            let instruction = service.initiate(provider).await?;

            if sub.get_flag("json") {
                return print_json(&InstructionView::from(&instruction));
            }
            match instruction {
                RedirectInstruction::Redirect { url, state } => {
                    println!("\nOpen this URL to authorize {}:\n\n  {}\n", provider, url);
                    println!("State: {}", state);
                }
                RedirectInstruction::Simulated { integration } => {
                    println!("\n✅ Connected (simulated): {}", integration.display_name);
                    println!("Integration ID: {}", integration.id);
                }
            }
            Ok(())
        }
        Some(("callback", sub)) => {
            let provider = required_arg(sub, "provider")?;
            let code = required_arg(sub, "code")?;
            let state = required_arg(sub, "state")?;

            let service = ConnectService::from_config(&config).await?;
            let integration = service.handle_callback(provider, code, state).await?;

            if sub.get_flag("json") {
                return print_json(&IntegrationSummary::from(&integration));
            }
            println!("\n✅ Connected: {}", integration.display_name);
            println!("Integration ID: {}", integration.id);
            Ok(())
        }
        Some(("integrations", sub)) => handle_integrations_command(config, sub).await,
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the command tree
pub fn build_cli() -> Command {
    Command::new("pm33")
        .about("PM33 Connect - OAuth connections to PM tools")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("PM33_CONFIG")
                .help("Path to the configuration file"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Server host"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_parser(clap::value_parser!(u16))
                        .help("Server port"),
                ),
        )
        .subcommand(
            Command::new("providers")
                .about("List supported providers and whether they run live or simulated")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("connect")
                .about("Start a connection and print the authorization URL")
                .arg(Arg::new("provider").required(true).index(1))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("callback")
                .about("Complete a connection with the code and state from the provider redirect")
                .arg(Arg::new("provider").required(true).index(1))
                .arg(Arg::new("code").long("code").required(true))
                .arg(Arg::new("state").long("state").required(true))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("integrations")
                .about("Manage connected integrations")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list")
                        .about("List integrations")
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove an integration")
                        .arg(Arg::new("id").required(true).index(1)),
                ),
        )
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON")
}

fn required_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| ConnectError::validation(format!("--{} is required", name)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_serve_command(mut config: Config, matches: &ArgMatches) -> Result<()> {
    let mut http = config.http.take().unwrap_or_else(HttpConfig::default);
    if let Some(host) = matches.get_one::<String>("host") {
        http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        http.port = *port;
    }
    config.http = Some(http);
    config.validate()?;

    crate::http::start_server(config).await
}

async fn handle_integrations_command(config: Config, matches: &ArgMatches) -> Result<()> {
    let service = ConnectService::from_config(&config).await?;

    match matches.subcommand() {
        Some(("list", sub)) => {
            let integrations = service.list_integrations().await?;
            if sub.get_flag("json") {
                let summaries: Vec<IntegrationSummary> =
                    integrations.iter().map(IntegrationSummary::from).collect();
                return print_json(&summaries);
            }
            println!("\nIntegrations:");
            for integration in integrations {
                println!(
                    "  {} ({}, {}{})",
                    integration.display_name,
                    integration.id,
                    integration.status.as_str(),
                    if integration.simulated { ", simulated" } else { "" }
                );
            }
        }
        Some(("remove", sub)) => {
            let id = required_arg(sub, "id")?;
            service.remove_integration(id).await?;
            println!("✅ Integration '{}' removed", id);
        }
        _ => {}
    }
    Ok(())
}
