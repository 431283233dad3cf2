//! tcpaste
//!
//! Raw TCP front-end for a haste-server.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌────────────────────────────────────────────────┐
//!                         │                    TCPASTE                      │
//!                         │                                                 │
//!   nc / socat client     │  ┌──────────┐    ┌──────────┐    ┌──────────┐  │
//!   ──────────────────────┼─▶│   net    │───▶│  ingest  │───▶│ upstream │──┼──▶ haste-server
//!                         │  │ listener │    │  stream  │    │  haste   │  │    POST /documents
//!                         │  └──────────┘    └──────────┘    └────┬─────┘  │
//!                         │                                       │        │
//!   "<base>/<key>\n"      │                 ┌──────────┐          │        │
//!   ◀─────────────────────┼─────────────────│ response │◀─────────┘        │
//!                         │                 └──────────┘                   │
//!                         │  ┌───────────────────────────────────────────┐ │
//!                         │  │ config · lifecycle · observability        │ │
//!                         │  └───────────────────────────────────────────┘ │
//!                         └────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;
use tokio::task::JoinError;

use tcpaste::config::Cli;
use tcpaste::lifecycle::{signals, Service, Shutdown};
use tcpaste::observability::logging;
use tcpaste::server::ServerError;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tcpaste: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.observability) {
        eprintln!("tcpaste: failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream.normalized_base_url(),
        max_payload_bytes = config.ingest.max_payload_bytes,
        idle_timeout_ms = config.ingest.idle_timeout_ms,
        "tcpaste starting"
    );

    let service = match Service::start(&config).await {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let mut server = tokio::spawn(service.serve(shutdown.subscribe()));

    tokio::select! {
        result = &mut server => return exit_code(result),
        _ = signals::wait_for_signal() => {
            tracing::info!("Shutting down...");
            shutdown.trigger();
        }
    }

    let code = exit_code(server.await);
    tracing::info!("Shutdown complete");
    code
}

fn exit_code(result: Result<Result<(), ServerError>, JoinError>) -> ExitCode {
    match result {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Error while running server");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Server task failed");
            ExitCode::FAILURE
        }
    }
}
