// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use tacview_relay::{config::Config, http, manager::SessionManager};

/// Realtime relay for Tacview telemetry: connects to upstream Tacview
/// real-time servers and fans state out to browser clients over SSE.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Path to the JSON relay configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the bind address from the config file, e.g. "0.0.0.0:8080".
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = CliArgs::parse();

    if let Err(err) = run(args).await {
        log::error!("{err}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), tacview_relay::Error> {
    let mut config = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    log::info!("configured with {} upstream server(s)", config.servers.len());

    let manager = Arc::new(SessionManager::new(config.servers.clone()));
    for name in manager.list_server_names() {
        manager.get_or_create(&name)?;
    }

    let app = http::router(Arc::clone(&manager));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log::info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
