use clap::{Args, Parser, Subcommand, ValueEnum};
use hal_core::{ActionResult, ErrorResponse, Message, MessageLevel};
use hal_lifecycle::features::lifecycle::controller::ServerGroupActions;
use hal_lifecycle::shared::config::LifecycleConfig;
use hal_lifecycle::shared::error::LifecycleResult;
use hal_lifecycle::shared::events::LifecycleEvent;
use hal_lifecycle::{ActionOutcome, Lifecycle, ServerCopy};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "halctl", about = "Run lifecycle actions against a management endpoint")]
struct Cli {
    /// Management endpoint, e.g. http://localhost:9990/management
    #[arg(long, env = "HAL_MANAGEMENT_URL")]
    url: Option<String>,

    #[arg(long, env = "HAL_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "HAL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Print events as JSON lines instead of messages
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Act on a single server
    Server(ServerArgs),
    /// Reload or restart a host controller
    Host(HostArgs),
    /// Act on all servers of a server group
    Group(GroupArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EntityAction {
    Reload,
    Restart,
    Suspend,
    Resume,
    Stop,
    Start,
    Destroy,
    Kill,
    Remove,
    Copy,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum HostAction {
    Reload,
    Restart,
}

#[derive(Args, Debug)]
struct SuspendArgs {
    /// Seconds to wait for in-flight requests on suspend and stop
    #[arg(long, default_value_t = 0)]
    suspend_timeout: u64,

    /// Start in suspended mode
    #[arg(long)]
    suspended: bool,
}

#[derive(Args, Debug)]
struct ServerArgs {
    action: EntityAction,

    /// Host of the server (domain mode)
    #[arg(long, required_unless_present = "standalone")]
    host: Option<String>,

    /// Name of the server (domain mode)
    #[arg(long, required_unless_present = "standalone")]
    name: Option<String>,

    /// Target the standalone server at the endpoint
    #[arg(long, conflicts_with_all = ["host", "name"])]
    standalone: bool,

    #[command(flatten)]
    suspend: SuspendArgs,

    /// Stop without waiting for in-flight requests
    #[arg(long)]
    now: bool,

    /// Name of the copy
    #[arg(long)]
    new_name: Option<String>,

    /// Host of the copy, defaults to the host of the source
    #[arg(long)]
    to_host: Option<String>,

    /// Server group of the copy, defaults to the group of the source
    #[arg(long)]
    to_group: Option<String>,

    #[arg(long)]
    port_offset: Option<i64>,
}

#[derive(Args, Debug)]
struct HostArgs {
    name: String,
    action: HostAction,

    /// Restart the running servers while reloading
    #[arg(long)]
    restart_servers: bool,
}

#[derive(Args, Debug)]
struct GroupArgs {
    name: String,
    action: EntityAction,

    #[command(flatten)]
    suspend: SuspendArgs,

    /// Name of the copy, defaults to <name>_copy
    #[arg(long)]
    new_name: Option<String>,
}

async fn run_server(lifecycle: &Lifecycle, args: ServerArgs) -> LifecycleResult<ActionOutcome> {
    let server = match (&args.host, &args.name) {
        (Some(host), Some(name)) if !args.standalone => {
            lifecycle.topology().server(host, name).await?
        }
        _ => lifecycle.topology().standalone_server().await?,
    };
    let actions = lifecycle.servers();
    match args.action {
        EntityAction::Reload => actions.reload(&server).await,
        EntityAction::Restart => actions.restart(&server).await,
        EntityAction::Suspend => actions.suspend(&server, args.suspend.suspend_timeout).await,
        EntityAction::Resume => actions.resume(&server).await,
        EntityAction::Stop if args.now => actions.stop_now(&server).await,
        EntityAction::Stop => actions.stop(&server, args.suspend.suspend_timeout).await,
        EntityAction::Start if args.suspend.suspended => {
            actions.start_in_suspended_mode(&server).await
        }
        EntityAction::Start => actions.start(&server).await,
        EntityAction::Destroy => actions.destroy(&server).await,
        EntityAction::Kill => actions.kill(&server).await,
        EntityAction::Remove => actions.remove(&server).await,
        EntityAction::Copy => {
            let target = ServerCopy {
                host: args.to_host.unwrap_or_else(|| server.host.clone()),
                name: args
                    .new_name
                    .unwrap_or_else(|| format!("{}_copy", server.name)),
                group: args.to_group,
                port_offset: args.port_offset,
            };
            actions.copy(&server, &target).await
        }
    }
}

async fn run_host(lifecycle: &Lifecycle, args: HostArgs) -> LifecycleResult<ActionOutcome> {
    let host = lifecycle.topology().host(&args.name).await?;
    let actions = lifecycle.hosts();
    match args.action {
        HostAction::Reload => actions.reload(&host, args.restart_servers).await,
        HostAction::Restart => actions.restart(&host).await,
    }
}

async fn run_group(lifecycle: &Lifecycle, args: GroupArgs) -> LifecycleResult<ActionOutcome> {
    let group = lifecycle.topology().server_group(&args.name).await?;
    let actions = lifecycle.server_groups();
    match args.action {
        EntityAction::Reload => actions.reload(&group).await,
        EntityAction::Restart => actions.restart(&group).await,
        EntityAction::Suspend => actions.suspend(&group, args.suspend.suspend_timeout).await,
        EntityAction::Resume => actions.resume(&group).await,
        EntityAction::Stop => actions.stop(&group, args.suspend.suspend_timeout).await,
        EntityAction::Start if args.suspend.suspended => {
            actions.start_in_suspended_mode(&group).await
        }
        EntityAction::Start => actions.start(&group).await,
        EntityAction::Destroy => actions.destroy(&group).await,
        EntityAction::Kill => actions.kill(&group).await,
        EntityAction::Remove => actions.remove(&group).await,
        EntityAction::Copy => {
            let new_name = args
                .new_name
                .unwrap_or_else(|| ServerGroupActions::copy_name(&group));
            actions.copy(&group, &new_name).await
        }
    }
}

fn print_message(message: &Message) {
    let level = match message.level {
        MessageLevel::Success => "OK",
        MessageLevel::Info => "INFO",
        MessageLevel::Warning => "WARN",
        MessageLevel::Error => "ERROR",
    };
    println!("[{}] {}", level, message);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = LifecycleConfig::from_env();
    if let Some(url) = cli.url {
        config.management_url = url;
    }
    config.username = cli.username.or(config.username);
    config.password = cli.password.or(config.password);

    info!(endpoint = %config.management_url, "Starting halctl");
    let lifecycle = Lifecycle::connect(config)?;
    let mut recorder = lifecycle.recorder();

    let outcome = match cli.command {
        Command::Server(args) => run_server(&lifecycle, args).await,
        Command::Host(args) => run_host(&lifecycle, args).await,
        Command::Group(args) => run_group(&lifecycle, args).await,
    };

    for event in recorder.events() {
        if cli.json {
            println!("{}", serde_json::to_string(&event)?);
        } else if let LifecycleEvent::Message(message) = &event {
            print_message(message);
        }
    }

    match outcome {
        Ok(outcome) if outcome.result == Some(ActionResult::Success) => Ok(()),
        Ok(outcome) => {
            warn!(action_id = %outcome.action_id, result = ?outcome.result, "Lifecycle action did not succeed");
            std::process::exit(1);
        }
        Err(error) => {
            let response: ErrorResponse = error.into();
            eprintln!("{}", serde_json::to_string(&response)?);
            std::process::exit(2);
        }
    }
}
