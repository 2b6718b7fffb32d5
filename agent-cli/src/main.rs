// SPDX-License-Identifier: Apache-2.0

//! Binary entry point: argument parsing, configuration loading, logging
//! setup, and process lifecycle wiring around `agent::Coordinator`. No
//! business logic lives here.

use std::path::PathBuf;
use std::process::ExitCode;

use agent::address::NextHopSelector;
use agent::advertiser::{AdvertisePrefix, Advertiser};
use agent::channel::MessageChannel;
use agent::config::{Config, ConfigError};
use agent::consumer::FIBConsumer;
use agent::fib::{self, Fib};
use agent::health;
use agent::learner::Learner;
use agent::parser::MessageParser;
use agent::prefix::IPPrefix;
use agent::Coordinator;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Exit code for missing or invalid configuration, per spec §6.
const CONFIG_ERROR_EXIT_CODE: u8 = 69;

#[derive(Parser, Debug)]
#[command(name = "bgp-fib-agentd", about = "BGP-to-FIB sidecar agent")]
struct Args {
    /// Path to the JSON configuration file.
    config: PathBuf,

    /// Build and log intended FIB operations without executing them.
    #[arg(long)]
    dry_run: bool,

    /// Read speaker messages from this named pipe instead of stdin.
    #[arg(long, requires = "out_pipe")]
    in_pipe: Option<String>,

    /// Write speaker commands to this named pipe instead of stdout.
    #[arg(long, requires = "in_pipe")]
    out_pipe: Option<String>,

    /// Buffer size for the named-pipe reader, bytes.
    #[arg(long, default_value_t = 4096)]
    read_chunk_size: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: &PathBuf) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    let config = Config::from_json(&text)?;
    config.validate()?;
    Ok(config)
}

fn build_advertise_prefixes(config: &Config) -> Result<Vec<AdvertisePrefix>, ConfigError> {
    let mut prefixes = Vec::with_capacity(config.advertise.prefixes.len());
    for (prefix_text, checker_configs) in &config.advertise.prefixes {
        let prefix = IPPrefix::parse(prefix_text)
            .map_err(|e| ConfigError::InvalidPrefix(prefix_text.clone(), e))?;
        let mut checkers = Vec::with_capacity(checker_configs.len());
        for checker_config in checker_configs {
            let checker = health::build_checker(&checker_config.class, &checker_config.kwargs)
                .map_err(|source| ConfigError::InvalidChecker {
                    prefix: prefix_text.clone(),
                    source,
                })?;
            checkers.push(checker);
        }
        prefixes.push(AdvertisePrefix::new(prefix, checkers));
    }
    Ok(prefixes)
}

fn build_fibs(config: &Config) -> Result<Vec<Box<dyn Fib>>, ConfigError> {
    let policy = config.learn.fib_policy();
    config
        .learn
        .fibs
        .iter()
        .map(|name| fib::build_fib(name, policy).map_err(ConfigError::from))
        .collect()
}

async fn build_channel(args: &Args) -> std::io::Result<MessageChannel> {
    match (&args.in_pipe, &args.out_pipe) {
        (Some(in_pipe), Some(out_pipe)) => {
            MessageChannel::from_fifos(in_pipe, out_pipe, args.read_chunk_size)
                .await
                .map_err(std::io::Error::other)
        }
        _ => Ok(MessageChannel::from_stdio()),
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let channel = build_channel(&args).await?;

    let next_hop = NextHopSelector::parse(&config.advertise.next_hop)
        .expect("validated by Config::validate");
    let advertise_prefixes = build_advertise_prefixes(&config)?;
    let local_prefixes: Vec<IPPrefix> = advertise_prefixes.iter().map(|p| p.prefix).collect();

    let (advertiser, healthy_reader) = Advertiser::new(
        advertise_prefixes,
        next_hop,
        config.advertise.interval_duration(),
        config.advertise.withdraw_on_exit,
        channel.clone(),
    );

    let fibs = build_fibs(&config)?;
    let (consumer, intent_sender) = FIBConsumer::new(fibs, args.dry_run);

    let learner = Learner::new(
        channel,
        MessageParser::default(),
        healthy_reader,
        local_prefixes,
        config.learn.filter_allow_default(),
        std::time::Duration::MAX,
        intent_sender,
    );

    let coordinator = Coordinator::spawn(advertiser, Some(learner), consumer);
    let cancel = coordinator.cancellation_token();

    ctrlc::set_handler(move || {
        cancel.cancel();
    })?;

    coordinator.run_until_cancelled().await;
    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::from(CONFIG_ERROR_EXIT_CODE);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(8)
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "unhandled failure");
            ExitCode::FAILURE
        }
    }
}
