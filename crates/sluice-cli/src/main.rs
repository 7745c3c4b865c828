//! 🚀 sluice-cli: the front door, the bouncer, the maitre d' of sluice.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: set up logging, read flags, load config, run, print the summary. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 🚰 Pull search results on a schedule, optionally push them into a HEC endpoint.
#[derive(Debug, Parser)]
#[command(name = "sluice", version, about)]
struct Args {
    /// 🔧 TOML config file. Without one, only SLUICE_* environment variables are used.
    #[arg(default_value = "sluice.toml")]
    config: PathBuf,

    /// 🛑 Stop after this many reads (overrides `runtime.max_polls`).
    #[arg(long)]
    max_polls: Option<u64>,

    /// 1️⃣ Read exactly once and exit. Same as `--max-polls 1`.
    #[arg(long, conflicts_with = "max_polls")]
    once: bool,
}

/// 🚀 main(): init tracing, parse args, load config, run, report.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // 🔒 A missing file is allowed: env vars alone may carry the whole config.
    let config_file = args.config.as_path();
    let config_file_which_exists = config_file
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Could not check whether the configuration file exists. Was checking here: '{}'",
                config_file.display()
            )
        })?
        .then_some(config_file);

    let mut app_config = sluice::app_config::load_config(config_file_which_exists).context(
        "💀 In sluice-cli, main, we couldn't load the config. Take a look at the file and the \
         SLUICE_* variables, make sure nothing obvious is missing.",
    )?;
    if args.once {
        app_config.runtime.max_polls = Some(1);
    } else if let Some(max_polls) = args.max_polls {
        app_config.runtime.max_polls = Some(max_polls);
    }

    match sluice::run(app_config).await {
        Ok(stats) => {
            eprintln!("{}", stats.render());
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }
            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like the search head or the collector isn't reachable. \
                     Check the management port (usually 8089) and the HEC port (usually 8088), \
                     and whether Splunk is actually running. Even servers need a nudge sometimes. ☕"
                );
            }
            std::process::exit(1);
        }
    }
}
