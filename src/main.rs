use std::path::PathBuf;

use clap::{Parser, Subcommand};
use f5_route_controller::controller::{run_controller, Ltm, RouterPlugin};
use f5_route_controller::{Error, RouterConfig};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the appliance and program routes until stopped
    Run(RunArgs),
    /// Initialize the appliance and exit
    Init(ApplianceArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ApplianceArgs {
    /// Management host of the appliance
    #[arg(long, env = "F5_HOST")]
    host: String,

    /// Management username
    #[arg(long, env = "F5_USERNAME", default_value = "admin")]
    username: String,

    /// Management password
    #[arg(long, env = "F5_PASSWORD", hide_env_values = true)]
    password: String,

    /// Virtual server for plain HTTP traffic
    #[arg(long, env = "F5_HTTP_VSERVER")]
    http_vserver: Option<String>,

    /// Virtual server for HTTPS traffic
    #[arg(long, env = "F5_HTTPS_VSERVER")]
    https_vserver: Option<String>,

    /// SSH private key used to upload certificates
    #[arg(long, env = "F5_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Do not verify the management certificate
    #[arg(long, env = "F5_INSECURE")]
    insecure: bool,

    /// Partition path for all created objects
    #[arg(long, env = "F5_PARTITION_PATH", default_value = "/Common")]
    partition_path: String,

    /// Self IP of the appliance on the VXLAN overlay (CIDR)
    #[arg(long, env = "F5_VXLAN_GATEWAY")]
    vxlan_gateway: Option<String>,

    /// Local address of the VXLAN tunnel
    #[arg(long, env = "F5_INTERNAL_ADDRESS")]
    internal_address: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    appliance: ApplianceArgs,

    /// Only watch this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,
}

impl ApplianceArgs {
    fn router_config(&self) -> Result<RouterConfig, Error> {
        RouterConfig {
            host: self.host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            http_vserver: self.http_vserver.clone(),
            https_vserver: self.https_vserver.clone(),
            private_key: self.private_key.clone(),
            insecure: self.insecure,
            partition_path: self.partition_path.clone(),
            vxlan_gateway: self.vxlan_gateway.clone(),
            internal_address: self.internal_address.clone(),
        }
        .validate()
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("F5 Route Controller v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init(appliance) => {
            init_tracing(appliance.log_json);
            let mut plugin = connect(&appliance)?;
            plugin.initialize().await
        }
        Commands::Run(run_args) => run(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn connect(args: &ApplianceArgs) -> Result<RouterPlugin, Error> {
    let config = args.router_config()?;
    info!(
        "Using appliance {} (partition {})",
        config.host, config.partition_path
    );
    Ok(RouterPlugin::new(Ltm::from_config(&config)?))
}

async fn run(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.appliance.log_json);

    info!("Starting F5 Route Controller v{}", env!("CARGO_PKG_VERSION"));

    let mut plugin = connect(&args.appliance)?;
    plugin.initialize().await?;

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    run_controller(client, args.namespace, plugin).await
}
