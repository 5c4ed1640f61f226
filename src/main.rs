//! Conn Proxy Command Line Tool
//!
//! This binary is the command-line interface for Conn Proxy.

use std::sync::Arc;
use clap::Parser;
use log::{error, info, warn};

use conn_proxy::{Proxy, VERSION, APP_NAME};
use conn_proxy::common::{Result, init_logger, install_panic_hook};
use conn_proxy::config::{
    check_warnings, ConfigBuilder, ConfigValues, ConfigurationProvider, ProxyConfig,
    DEFAULT_CONFIG_FILE, ENV_PREFIX,
};

/// Conn Proxy: forwarding HTTP proxy with CONNECT tunnels
///
/// Settings are layered: built-in defaults, then the configuration file, then
/// `CONN_PROXY_*` environment variables, then command line options.
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[clap(long, env = "CONN_PROXY_CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Bind host
    #[clap(long)]
    host: Option<String>,

    /// Listening port
    #[clap(short, long)]
    port: Option<u16>,

    /// Relay buffer size in bytes (0 or less selects 16384)
    #[clap(long, allow_hyphen_values = true)]
    buffer_size: Option<i64>,

    /// Maximum concurrently handled connections (0 or less selects 100)
    #[clap(long, allow_hyphen_values = true)]
    max_connections: Option<i64>,

    /// Connection timeout in seconds (below 2 selects 10)
    #[clap(long, allow_hyphen_values = true)]
    timeout: Option<i64>,

    /// Comma separated allowed client hosts, or `*` for everyone
    #[clap(long)]
    allow_ip: Option<String>,

    /// Relay every connection to this fixed host:port without parsing HTTP
    #[clap(long)]
    pass_proxy: Option<String>,

    /// Verbose per-connection logging
    #[clap(long)]
    print_log: bool,

    /// Log a connection summary every 10 seconds
    #[clap(long)]
    print_summary: bool,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,
}

impl Args {
    /// Command line layer: only options actually given override lower layers
    fn to_values(&self) -> ConfigValues {
        ConfigValues {
            host: self.host.clone(),
            port: self.port,
            buffer_size: self.buffer_size,
            max_connections: self.max_connections,
            timeout: self.timeout,
            allow_ip: self.allow_ip.clone(),
            pass_proxy: self.pass_proxy.clone(),
            print_log: self.print_log.then_some(true),
            print_summary: self.print_summary.then_some(true),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let provider = ConfigBuilder::new()
        .with_defaults()
        .with_file(&args.config_file)
        .with_env(ENV_PREFIX)
        .with_cli(args.to_values());

    // A broken configuration is not fatal: keep going with the defaults
    let (config, load_error) = match provider.load_config() {
        Ok(config) => (config, None),
        Err(e) => (ProxyConfig::default(), Some(e)),
    };

    init_logger(config.effective_log_level());
    install_panic_hook();

    info!("Starting {} v{}", APP_NAME, VERSION);
    if let Some(e) = load_error {
        error!("Failed to load configuration, using defaults: {}", e);
    }
    for warning in check_warnings(&config) {
        warn!("{}", warning);
    }
    config.log();

    let proxy = Proxy::bind(Arc::new(config)).await?;
    info!("Proxy service ready, press Ctrl+C to stop");

    tokio::select! {
        result = proxy.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}
