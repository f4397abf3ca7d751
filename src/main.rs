//! This is a load-testing binary which simulates concurrent users of the
//! English school web application.
//!
//! The YAML configuration defines one or more scenarios, each a population
//! of simulated users: authenticate once, then repeatedly wait a random
//! *think time* and execute one task from a weighted catalog of HTTP calls
//! against the API. At the end, per-task latency percentiles and
//! failure/skip counts are printed per scenario and in total.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use crate::api::ApiRemote;
use crate::config::Config;
use crate::user::Scenario;

mod api;
mod config;
mod loadtest;
mod user;

/// Load tester for the English school web API
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_file = std::fs::File::open(args.config).context("failed to open config file")?;
    let config: Config =
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")?;

    let remote = ApiRemote::new(&config.target);
    let scenarios = config
        .scenarios
        .into_iter()
        .map(|s| {
            Scenario::builder(s.name)
                .users(s.users)
                .wait(s.wait.min, s.wait.max)
                .manager_ratio(s.manager_ratio)
                .weights(s.weights)
                .build()
        })
        .collect();

    loadtest::run(remote, scenarios, config.duration).await?;

    Ok(())
}
