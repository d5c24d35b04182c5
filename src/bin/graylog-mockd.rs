use std::path::PathBuf;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;
use tokio::signal;

use graylog_mock::cli_utils::{exit_with_error, setup_tracing};
use graylog_mock::{MockServer, MockServerConfig};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Path to a JSON configuration file")]
    config: Option<String>,
    #[arrrg(optional, "Path to savefile for persistent state storage")]
    savefile: Option<String>,
    #[arrrg(optional, "Host to bind the HTTP server")]
    host: Option<String>,
    #[arrrg(optional, "Port to bind the HTTP server")]
    port: Option<u16>,
    #[arrrg(flag, "Disable basic authentication")]
    no_auth: bool,
    #[arrrg(flag, "Enable verbose logging")]
    verbose: bool,
}

const HELP_TEXT: &str = r#"graylog-mockd - Graylog API mock server

USAGE:
    graylog-mockd [OPTIONS]

OPTIONS:
    --config <PATH>      JSON configuration file; flags override its values
    --savefile <PATH>    Path to savefile for persistent state storage
    --host <HOST>        Host to bind the HTTP server [default: 127.0.0.1]
    --port <PORT>        Port to bind the HTTP server [default: 8000]
    --no-auth            Disable basic authentication
    --verbose            Enable verbose logging

DESCRIPTION:
    Runs an in-memory Graylog REST API under /api. An empty store is seeded
    with the user admin/admin, the Admin and Reader roles and a default index set.

    The server supports graceful shutdown via Ctrl+C.

API ENDPOINTS:
    Index Sets:
      GET    /api/system/indices/index_sets[?stats=true]
      POST   /api/system/indices/index_sets
      GET    /api/system/indices/index_sets/stats
      GET    /api/system/indices/index_sets/{id}
      PUT    /api/system/indices/index_sets/{id}
      DELETE /api/system/indices/index_sets/{id}
      GET    /api/system/indices/index_sets/{id}/stats
      PUT    /api/system/indices/index_sets/{id}/default

    Alerts:
      GET    /api/streams/alerts[?skip=&limit=&since=]
      GET    /api/streams/alerts/{id}
      GET    /api/alerts/conditions

    Users:
      GET    /api/users
      POST   /api/users
      GET    /api/users/{username}
      PUT    /api/users/{username}
      DELETE /api/users/{username}

    Roles:
      GET    /api/roles
      POST   /api/roles
      GET    /api/roles/{rolename}
      PUT    /api/roles/{rolename}
      DELETE /api/roles/{rolename}
      GET    /api/roles/{rolename}/members
      PUT    /api/roles/{rolename}/members/{username}
      DELETE /api/roles/{rolename}/members/{username}

    Inputs:
      GET    /api/system/inputs
      POST   /api/system/inputs
      GET    /api/system/inputs/{id}
      PUT    /api/system/inputs/{id}
      DELETE /api/system/inputs/{id}"#;

fn config_from_args(args: Args) -> MockServerConfig {
    let mut config = match &args.config {
        Some(path) => match MockServerConfig::load(&PathBuf::from(path)) {
            Ok(config) => config,
            Err(e) => exit_with_error(&format!("Failed to read config {}: {}", path, e)),
        },
        None => MockServerConfig::default().with_bind_address("127.0.0.1:8000"),
    };
    if args.host.is_some() || args.port.is_some() {
        let (default_host, default_port) = config
            .bind_address
            .rsplit_once(':')
            .map(|(h, p)| (h.to_string(), p.parse().unwrap_or(8000)))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 8000));
        config.bind_address = format!(
            "{}:{}",
            args.host.unwrap_or(default_host),
            args.port.unwrap_or(default_port)
        );
    }
    if let Some(savefile) = args.savefile {
        config.savefile = Some(PathBuf::from(savefile));
    }
    if args.no_auth {
        config.auth_enabled = false;
    }
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, free) = Args::from_command_line("USAGE: graylog-mockd [OPTIONS]");

    if !free.is_empty() && free[0] == "help" {
        println!("{}", HELP_TEXT);
        return Ok(());
    }

    setup_tracing(args.verbose);
    let config = config_from_args(args);

    let mut server = match MockServer::new(config.clone()).await {
        Ok(server) => server,
        Err(e) => exit_with_error(&format!(
            "Failed to start on {}: {}",
            config.bind_address, e
        )),
    };
    server.start();

    println!("graylog-mockd listening on: {}", server.endpoint());
    match &config.savefile {
        Some(path) => println!("Savefile: {}", path.display()),
        None => println!("Savefile: none (state is lost on exit)"),
    }
    if !config.auth_enabled {
        println!("Authentication: disabled");
    }
    println!("Use Ctrl+C for graceful shutdown");

    signal::ctrl_c().await?;
    println!();
    println!("Shutdown signal received, stopping server gracefully...");
    server.close().await;
    println!("graylog-mockd stopped");

    Ok(())
}
