// Armada CLI - run commands across a fleet of hosts

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tokio::sync::mpsc;

use armada::config::{FleetConfig, RunnerKind};
use armada::executor::{Context, JobResult, Task};
use armada::fleet::Fleet;
use armada::inventory::{filter, FromHostList, FromYaml, Inventory, InventoryPlugin};
use armada::logging::init_logging;
use armada::output::{
    render_results, render_results_json, suggest_fix, ArmadaError, OutputFormat, RunSummary,
};
use armada::plugins::{create_processor, Processors};
use armada::tasks::{LocalCommand, RemoteCommand, SftpUpload, SshClose, SshOpen, TaskGroup};

#[derive(Parser)]
#[command(
    name = "armada",
    about = "Run tasks across a fleet of hosts",
    version,
    disable_colored_help = true,
    term_width = 0,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    output_format: OutputFormat,

    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
#[command(disable_colored_help = true)]
enum Commands {
    /// Run a shell command on every host
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Command to execute
        #[arg(short, long)]
        command: String,

        /// Run the command on this machine once per host instead of over SSH
        #[arg(long)]
        local: bool,

        /// Shell used with --local (default sh)
        #[arg(long, requires = "local")]
        shell: Option<String>,
    },

    /// Upload a file to every host over SFTP
    Upload {
        #[command(flatten)]
        target: TargetArgs,

        /// Local file to upload
        #[arg(long)]
        src: PathBuf,

        /// Destination path on the hosts
        #[arg(long)]
        dst: String,
    },

    /// List hosts in inventory
    Inventory {
        /// Path to the inventory file
        #[arg(short, long, required_unless_present = "hosts")]
        inventory: Option<PathBuf>,

        /// Comma-separated host list (alternative to inventory file)
        #[arg(short = 'H', long)]
        hosts: Option<String>,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Path to the inventory file
    #[arg(short, long, required_unless_present = "hosts")]
    inventory: Option<PathBuf>,

    /// Comma-separated host list (alternative to inventory file)
    #[arg(short = 'H', long)]
    hosts: Option<String>,

    /// Limit to specific hosts (comma-separated inventory keys)
    #[arg(short, long)]
    limit: Option<String>,

    /// Only hosts with this platform
    #[arg(long)]
    platform: Option<String>,

    /// Scheduling strategy (parallel or sorted)
    #[arg(long, default_value = "parallel")]
    runner: RunnerKind,

    /// Maximum parallel hosts (0 = unbounded)
    #[arg(long, default_value = "0")]
    forks: usize,

    /// Overall deadline for the run in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// SSH connection timeout in seconds
    #[arg(long, default_value = "30")]
    connect_timeout: u64,

    /// SSH user (for hosts that do not set one)
    #[arg(short, long)]
    user: Option<String>,

    /// Path to SSH private key
    #[arg(long)]
    private_key: Option<PathBuf>,

    /// Prompt for SSH password
    #[arg(short = 'k', long)]
    ask_pass: bool,

    /// Callback plugins (format: name:args, can repeat)
    #[arg(long = "callback")]
    callbacks: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Run {
            target,
            command,
            local,
            shell,
        } => {
            let local_shell = local.then(|| shell.as_deref().unwrap_or("sh"));
            run_command(&target, &command, local_shell, cli.output_format, !cli.no_color).await
        }
        Commands::Upload { target, src, dst } => {
            upload_file(&target, src, dst, cli.output_format, !cli.no_color).await
        }
        Commands::Inventory { inventory, hosts } => {
            list_inventory(inventory, hosts).map(|_| RunSummary::default())
        }
    };

    match result {
        Ok(summary) if summary.has_failures() => std::process::exit(2),
        Ok(_) => {}
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(hint) = e.downcast_ref::<ArmadaError>().and_then(suggest_fix) {
                eprintln!("  {} {}", "Hint:".yellow(), hint);
            }
            std::process::exit(1);
        }
    }
}

/// Load the inventory from `-i` or `-H`, `-i` winning when both are set
fn load_inventory(
    inventory: Option<&PathBuf>,
    hosts: Option<&str>,
    default_user: Option<&str>,
) -> Result<Inventory> {
    let plugin: Box<dyn InventoryPlugin> = match (inventory, hosts) {
        (Some(path), _) => Box::new(FromYaml::new(path)),
        (None, Some(hosts)) => Box::new(FromHostList {
            hosts: hosts.to_string(),
            default_user: default_user.map(str::to_string),
        }),
        (None, None) => bail!("no inventory given; pass -i <file> or -H <hosts>"),
    };

    Ok(plugin.create()?)
}

/// Build the fleet, run configuration and run context for a targeted command
fn prepare(target: &TargetArgs, color: bool) -> Result<(Fleet, FleetConfig, Context)> {
    let password = if target.ask_pass {
        Some(prompt_password("SSH password: ")?)
    } else {
        None
    };

    let config = FleetConfig {
        runner: target.runner,
        max_parallel_hosts: target.forks,
        connect_timeout: Duration::from_secs(target.connect_timeout),
        ssh_user: target.user.clone(),
        ssh_private_key: target.private_key.clone(),
        ssh_password: password,
        color,
        ..Default::default()
    };

    let inventory = load_inventory(
        target.inventory.as_ref(),
        target.hosts.as_deref(),
        target.user.as_deref(),
    )?;

    let processors = target
        .callbacks
        .iter()
        .map(|spec| create_processor(spec))
        .collect::<Result<Processors, _>>()?;

    let mut fleet = Fleet::new()
        .with_inventory(inventory)
        .with_runner(config.build_runner())
        .with_processors(processors);
    if let Some(limit) = &target.limit {
        let keys: Vec<&str> = limit.split(',').map(str::trim).collect();
        fleet = fleet.limit(keys.as_slice());
    }
    if let Some(platform) = &target.platform {
        fleet = fleet.filter(&filter::with_platform(platform.as_str()));
    }

    if fleet.inventory().is_empty() {
        bail!("no hosts left to run against after filtering");
    }

    let ctx = match target.timeout {
        Some(secs) => Context::background().with_timeout(Duration::from_secs(secs)),
        None => Context::background().with_cancel(),
    };

    let on_interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    Ok((fleet, config, ctx))
}

async fn render(
    mut results: mpsc::Receiver<JobResult>,
    title: &str,
    format: OutputFormat,
    color: bool,
) -> Result<RunSummary> {
    let mut stdout = io::stdout();
    let summary = match format {
        OutputFormat::Text => render_results(&mut stdout, &mut results, title, color).await?,
        OutputFormat::Json => render_results_json(&mut stdout, &mut results, title).await?,
    };
    stdout.flush().ok();
    Ok(summary)
}

/// Open sessions, run `work`, render, then close the sessions again
async fn run_over_ssh(
    fleet: &Fleet,
    config: &FleetConfig,
    ctx: &Context,
    work: Arc<dyn Task>,
    title: &str,
    format: OutputFormat,
) -> Result<RunSummary> {
    let group = TaskGroup::new(title)
        .with_task(Arc::new(SshOpen::new(config.ssh_config())))
        .with_task(work)
        .stop_on_error(true);

    let results = fleet
        .run_sync(ctx, Arc::new(group))
        .await
        .context("problem running task")?;
    let summary = render(results, title, format, config.color).await?;

    // Close with a fresh context so a cancelled run still hangs up
    let mut closed = fleet
        .with_processors(Processors::new())
        .run_sync(&Context::background(), Arc::new(SshClose))
        .await
        .context("problem closing connections")?;
    while let Some(result) = closed.recv().await {
        if let Some(e) = result.err() {
            tracing::debug!(host = %result.host().hostname, "close failed: {}", e);
        }
    }

    Ok(summary)
}

async fn run_command(
    target: &TargetArgs,
    command: &str,
    local_shell: Option<&str>,
    format: OutputFormat,
    color: bool,
) -> Result<RunSummary> {
    let (fleet, config, ctx) = prepare(target, color)?;

    if let Some(shell) = local_shell {
        let task = Arc::new(LocalCommand::new(command).with_shell(shell));
        let results = fleet
            .run_sync(&ctx, task)
            .await
            .context("problem running task")?;
        return render(results, command, format, config.color).await;
    }

    let task = Arc::new(RemoteCommand::new(command));
    run_over_ssh(&fleet, &config, &ctx, task, command, format).await
}

async fn upload_file(
    target: &TargetArgs,
    src: PathBuf,
    dst: String,
    format: OutputFormat,
    color: bool,
) -> Result<RunSummary> {
    if !src.is_file() {
        bail!("source file {} does not exist", src.display());
    }

    let (fleet, config, ctx) = prepare(target, color)?;
    let title = format!("upload {} -> {}", src.display(), dst);
    let task = Arc::new(SftpUpload::new(src, dst));

    run_over_ssh(&fleet, &config, &ctx, task, &title, format).await
}

fn list_inventory(inventory: Option<PathBuf>, hosts: Option<String>) -> Result<()> {
    let inventory = load_inventory(inventory.as_ref(), hosts.as_deref(), None)?;

    println!(
        "{} {} host(s)",
        "Found".green(),
        inventory.host_count()
    );
    println!();

    for key in inventory.sorted_keys() {
        let Some(host) = inventory.get_host(key) else {
            continue;
        };

        println!("  {} {}", "•".cyan(), key.white().bold());
        println!("    {} {}", "Address:".dimmed(), host.hostname);
        println!("    {} {}", "Port:".dimmed(), host.port);

        if !host.username.is_empty() {
            println!("    {} {}", "User:".dimmed(), host.username);
        }
        if !host.platform.is_empty() {
            println!("    {} {}", "Platform:".dimmed(), host.platform);
        }

        println!();
    }

    Ok(())
}

fn prompt_password(prompt: &str) -> Result<String> {
    // Prompt on stderr so it shows even with redirected stdout
    eprint!("{}", prompt.cyan());
    io::stderr().flush().ok();

    let password = rpassword::read_password().context("failed to read password")?;
    let password = password.trim().to_string();

    if password.is_empty() {
        bail!("password cannot be empty");
    }

    Ok(password)
}
