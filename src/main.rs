// Proxy Control - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Proxy Control
//!
//! Keeps the desktop proxy settings in sync with the network the machine is
//! attached to.
//!
//! Runs in the foreground and reads line commands from standard input.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

mod application;
mod models;
mod network_utils;
mod services;
mod storage;
mod sync;
mod system;

use application::{parse_profile, Application};
use services::MappingTarget;

/// Human-readable application name.
pub const APP_NAME: &str = models::APP_NAME;

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS]",
        env::args().next().unwrap_or_else(|| "proxy-control".to_string())
    );
    println!();
    println!("Switches the desktop proxy profile to the one mapped for the current network.");
    println!();
    println!("Options:");
    println!("  -h, --help           Show this help message and exit");
    println!("  -v, --version        Show version information and exit");
    println!("  -d, --debug          Enable debug logging");
    println!("  -c, --config <path>  Use this configuration file");
    println!();
    print_commands();
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG         Set log level (trace, debug, info, warn, error)");
}

fn print_commands() {
    println!("Commands (one per line on standard input):");
    println!("  status                            Show proxy, profile and network");
    println!("  apply                             Apply the mapping for the current network");
    println!("  use <name>                        Apply a profile");
    println!("  toggle                            Turn the proxy on or off");
    println!("  auto on|off                       Switch automatic mapping");
    println!("  interval <seconds>                Set the network check interval");
    println!("  profiles                          List profiles");
    println!("  add <name> <url> [bypass]         Add a profile (host 'gateway' follows the gateway)");
    println!("  edit <old> <new> <url> [bypass]   Replace a profile");
    println!("  remove <name>                     Delete a profile");
    println!("  mappings                          List network mappings");
    println!("  map <name|off>                    Map the current network");
    println!("  unmap                             Remove the current network's mapping");
    println!("  help                              Show this list");
    println!("  quit                              Exit");
}

/// A parsed stdin command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Apply,
    Use(String),
    Toggle,
    Auto(bool),
    Interval(u64),
    Profiles,
    Add {
        name: String,
        url: String,
        bypass: Option<String>,
    },
    Edit {
        old: String,
        new: String,
        url: String,
        bypass: Option<String>,
    },
    Remove(String),
    Mappings,
    Map(MappingTarget),
    Unmap,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. `Ok(None)` for a blank line.
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Ok(None);
        };

        let command = match (verb, args) {
            ("status", []) => Self::Status,
            ("apply", []) => Self::Apply,
            ("use", [name]) => Self::Use(name.to_string()),
            ("toggle", []) => Self::Toggle,
            ("auto", ["on"]) => Self::Auto(true),
            ("auto", ["off"]) => Self::Auto(false),
            ("interval", [secs]) => Self::Interval(
                secs.parse()
                    .map_err(|_| format!("Invalid interval: {}", secs))?,
            ),
            ("profiles", []) => Self::Profiles,
            ("add", [name, url, rest @ ..]) if rest.len() <= 1 => Self::Add {
                name: name.to_string(),
                url: url.to_string(),
                bypass: rest.first().map(|b| b.to_string()),
            },
            ("edit", [old, new, url, rest @ ..]) if rest.len() <= 1 => Self::Edit {
                old: old.to_string(),
                new: new.to_string(),
                url: url.to_string(),
                bypass: rest.first().map(|b| b.to_string()),
            },
            ("remove", [name]) => Self::Remove(name.to_string()),
            ("mappings", []) => Self::Mappings,
            ("map", ["off"]) => Self::Map(MappingTarget::Disabled),
            ("map", [name]) => Self::Map(MappingTarget::Profile(name.to_string())),
            ("unmap", []) => Self::Unmap,
            ("help", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            _ => return Err(format!("Unknown command: {}", line.trim())),
        };
        Ok(Some(command))
    }
}

/// Run one command. Returns `false` when the loop should end.
fn execute(app: &Application, command: Command) -> models::Result<bool> {
    match command {
        Command::Status => println!("{}", app.status()),
        Command::Apply => app.apply_mapping(),
        Command::Use(name) => {
            app.use_profile(&name)?;
            println!("Using profile [{}]", name);
        }
        Command::Toggle => {
            let enabled = app.toggle_proxy()?;
            println!("Proxy {}", if enabled { "enabled" } else { "disabled" });
        }
        Command::Auto(enabled) => app.set_auto_map(enabled),
        Command::Interval(seconds) => app.set_check_interval(seconds)?,
        Command::Profiles => {
            let active = app.config().active();
            for named in app.config().profiles() {
                let marker = if active.as_deref() == Some(named.name.as_str()) {
                    '*'
                } else {
                    ' '
                };
                println!("{} {}  {}", marker, named.name, named.profile.description());
            }
        }
        Command::Add { name, url, bypass } => {
            app.add_profile(&name, parse_profile(&url, bypass.as_deref())?)?;
        }
        Command::Edit {
            old,
            new,
            url,
            bypass,
        } => {
            app.update_profile(&old, &new, parse_profile(&url, bypass.as_deref())?)?;
        }
        Command::Remove(name) => app.remove_profile(&name)?,
        Command::Mappings => {
            for entry in app.mappings().lookup() {
                println!("{}  ->  {}", entry.identity, entry.target);
            }
        }
        Command::Map(target) => {
            let key = app.map_current(target.clone())?;
            println!("{}  ->  {}", key, target);
        }
        Command::Unmap => {
            let key = app.unmap_current()?;
            println!("Removed mapping for {}", key);
        }
        Command::Help => print_commands(),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Print external changes as they are observed.
fn subscribe(app: &Application) {
    let proxy = app.proxy_events();
    proxy
        .enabled
        .set(|v| println!("* proxy {}", if v { "enabled" } else { "disabled" }));
    proxy.protocol.set(|v| match v {
        Some(p) => println!("* proxy protocol: {}", p),
        None => println!("* proxy protocol cleared"),
    });
    proxy
        .host
        .set(|v| println!("* proxy host: {}", v.as_deref().unwrap_or("-")));
    proxy.port.set(|v| match v {
        Some(p) => println!("* proxy port: {}", p),
        None => println!("* proxy port cleared"),
    });
    proxy
        .bypass_list
        .set(|v| println!("* proxy bypass: {}", v.join(";")));
    proxy
        .follow_gateway
        .set(|v| println!("* proxy follows gateway: {}", v));

    let theme = app.theme_events();
    theme
        .window
        .set(|light| println!("* window theme: {}", if light { "light" } else { "dark" }));
    theme
        .taskbar
        .set(|light| println!("* taskbar theme: {}", if light { "light" } else { "dark" }));

    app.config()
        .active_changed()
        .set(|name| println!("* active profile: {}", name));
}

fn run(app: &Application) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                tracing::error!("Failed to read standard input: {}", e);
                break;
            }
            None => break,
        };

        match Command::parse(&line) {
            Ok(Some(command)) => match execute(app, command) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => eprintln!("Error: {}", e),
            },
            Ok(None) => {}
            Err(message) => {
                eprintln!("{}", message);
                eprintln!("Type 'help' for the list of commands.");
            }
        }
    }
}

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let mut debug_mode = false;
    let mut config_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "-v" | "--version" => {
                print_version();
                return ExitCode::SUCCESS;
            }
            "-d" | "--debug" => {
                debug_mode = true;
            }
            "-c" | "--config" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("Option {} requires a path.", arg);
                    return ExitCode::FAILURE;
                }
            },
            _ => {
                eprintln!("Unknown option: {}", arg);
                eprintln!("Try '--help' for more information.");
                return ExitCode::FAILURE;
            }
        }
    }

    // Initialize logging with appropriate level
    let log_level = if debug_mode {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let app = Application::new(config_path);
    subscribe(&app);
    app.start();
    run(&app);
    app.shutdown();

    ExitCode::SUCCESS
}
