use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vmware_aiops::client::{CreateVmSpec, ReconfigureSpec, SnapshotSpec};
use vmware_aiops::config::{self, AppConfig};
use vmware_aiops::confirm::DialoguerPrompter;
use vmware_aiops::model::Severity;
use vmware_aiops::ops::{self, LifecycleCommand, OutcomeKind, VmOps};
use vmware_aiops::scanner::{get_active_alarms, get_recent_events};
use vmware_aiops::scheduler::pidfile::{self, PidFile};
use vmware_aiops::AppContext;

#[derive(Parser)]
#[command(
    name = "vmware-aiops",
    about = "Issue scanning and audited lifecycle operations for vCenter/ESXi fleets",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $VMWARE_AIOPS_CONFIG or ~/.vmware-aiops/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target name from the config (defaults to the first one)
    #[arg(long, short, global = true)]
    target: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Control the background scanner
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Run scan cycles on demand
    Scan {
        #[command(subcommand)]
        action: ScanAction,
    },

    /// Query alarms and events
    Health {
        #[command(subcommand)]
        action: HealthAction,
    },

    /// List inventory objects
    Inventory {
        #[command(subcommand)]
        action: InventoryAction,
    },

    /// VM lifecycle operations
    Vm {
        #[command(subcommand)]
        action: VmAction,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Run the scanner in the foreground until SIGINT/SIGTERM
    Start,
    /// Report whether a daemon is running
    Status,
    /// Ask a running daemon to stop
    Stop,
}

#[derive(Subcommand)]
enum ScanAction {
    /// Run one scan cycle (all targets, or --target only)
    Now,
}

#[derive(Subcommand)]
enum HealthAction {
    /// Active triggered alarms
    Alarms,
    /// Recent events at or above a severity
    Events {
        /// Lookback window in hours
        #[arg(long, default_value = "24")]
        hours: u32,

        /// Minimum severity: critical, warning or info
        #[arg(long, default_value = "warning")]
        severity: Severity,
    },
}

#[derive(Subcommand)]
enum InventoryAction {
    /// All virtual machines
    Vms,
    /// All ESXi hosts
    Hosts,
}

#[derive(Subcommand)]
enum VmAction {
    /// Show VM details
    Info { vm: String },

    /// Power on a VM
    PowerOn { vm: String },

    /// Power off a VM (graceful guest shutdown unless --force)
    PowerOff {
        vm: String,
        /// Hard power off instead of a guest shutdown
        #[arg(long)]
        force: bool,
    },

    /// Hard reset a VM
    Reset { vm: String },

    /// Suspend a VM
    Suspend { vm: String },

    /// Create a new VM
    Create {
        name: String,
        #[arg(long, default_value = "2")]
        cpu: u32,
        /// Memory in MB
        #[arg(long, default_value = "4096")]
        memory: u64,
        /// Disk size in GB
        #[arg(long, default_value = "40")]
        disk: u64,
        #[arg(long, default_value = "VM Network")]
        network: String,
        #[arg(long)]
        datastore: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value = "otherGuest64")]
        guest_id: String,
    },

    /// Delete a VM (powers it off first)
    Delete { vm: String },

    /// Change CPU count and/or memory
    Reconfigure {
        vm: String,
        #[arg(long)]
        cpu: Option<u32>,
        /// Memory in MB
        #[arg(long)]
        memory: Option<u64>,
    },

    /// Take a snapshot
    SnapshotCreate {
        vm: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Include guest memory
        #[arg(long)]
        memory: bool,
    },

    /// List snapshots as a tree
    SnapshotList { vm: String },

    /// Revert to a snapshot
    SnapshotRevert {
        vm: String,
        #[arg(long)]
        name: String,
    },

    /// Delete a snapshot
    SnapshotDelete {
        vm: String,
        #[arg(long)]
        name: String,
        /// Also remove child snapshots
        #[arg(long)]
        children: bool,
    },

    /// Clone a VM
    Clone {
        vm: String,
        #[arg(long)]
        new_name: String,
    },

    /// vMotion a VM to another host
    Migrate {
        vm: String,
        #[arg(long)]
        host: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Daemon { action } => match action {
            DaemonAction::Start => {
                vmware_aiops::run_daemon(cli.config.as_deref()).await?;
            }
            DaemonAction::Status => daemon_status(),
            DaemonAction::Stop => daemon_stop()?,
        },
        command => {
            let ctx = load_context(cli.config.as_deref()).await?;
            let result = run_command(&ctx, cli.target.as_deref(), command).await;
            // Server-side sessions are released on every exit path.
            ctx.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_command(ctx: &AppContext, target: Option<&str>, command: Commands) -> Result<()> {
    match command {
        Commands::Scan {
            action: ScanAction::Now,
        } => scan_now(ctx, target).await,
        Commands::Health { action } => health(ctx, target, action).await,
        Commands::Inventory { action } => inventory(ctx, target, action).await,
        Commands::Vm { action } => vm(ctx, target, action).await,
        Commands::Daemon { .. } => bail!("daemon commands do not take a session context"),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_context(path: Option<&std::path::Path>) -> Result<AppContext> {
    let config = AppConfig::load_from(path).context("failed to load config")?;
    Ok(AppContext::with_rest(config).await?)
}

fn pid_path() -> PathBuf {
    config::state_dir().join("daemon.pid")
}

fn daemon_status() {
    match PidFile::read(&pid_path()) {
        Some(pid) if pidfile::process_alive(pid) => println!("Daemon running (PID {pid})"),
        Some(pid) => println!("Daemon not running (stale pid file for PID {pid})"),
        None => println!("Daemon not running"),
    }
}

fn daemon_stop() -> Result<()> {
    let path = pid_path();
    let Some(pid) = PidFile::read(&path) else {
        println!("Daemon not running");
        return Ok(());
    };
    if !pidfile::process_alive(pid) {
        std::fs::remove_file(&path)
            .with_context(|| format!("failed to remove stale pid file {}", path.display()))?;
        println!("Daemon not running, removed stale pid file");
        return Ok(());
    }
    pidfile::terminate(pid).with_context(|| format!("failed to signal PID {pid}"))?;
    println!("Sent SIGTERM to daemon (PID {pid})");
    Ok(())
}

async fn scan_now(ctx: &AppContext, target: Option<&str>) -> Result<()> {
    let targets = match target {
        Some(name) => {
            ctx.config.get_target(name)?;
            vec![name.to_string()]
        }
        None => ctx.sessions.list_targets(),
    };
    if targets.is_empty() {
        bail!("no targets configured, check config.yaml");
    }

    let orchestrator = ctx.orchestrator().await?;
    let report = orchestrator.run_for(&targets).await;

    println!(
        "Scan {} finished: {} target(s) scanned, {} failed",
        report.cycle_id,
        report.targets_scanned,
        report.targets_failed.len()
    );
    println!(
        "Issues: {} critical, {} warning, {} info",
        report.count(Severity::Critical),
        report.count(Severity::Warning),
        report.count(Severity::Info)
    );
    if report.issues.is_empty() {
        return Ok(());
    }
    println!();
    println!("{:<9} | {:<18} | {:<25} | Message", "Severity", "Source", "Entity");
    println!("{}", "-".repeat(80));
    for issue in &report.issues {
        println!(
            "{:<9} | {:<18} | {:<25} | {}",
            issue.severity.as_str(),
            issue.source.to_string(),
            issue.entity,
            issue.message
        );
    }
    Ok(())
}

async fn health(ctx: &AppContext, target: Option<&str>, action: HealthAction) -> Result<()> {
    let session = ctx.sessions.connect(target).await?;
    match action {
        HealthAction::Alarms => {
            let alarms = get_active_alarms(session.as_ref()).await?;
            ctx.audit
                .log_query(session.target(), "alarms", "get_active_alarms")
                .await?;
            if alarms.is_empty() {
                println!("No active alarms");
                return Ok(());
            }
            println!("{:<9} | {:<30} | {:<25} | Time", "Severity", "Alarm", "Entity");
            println!("{}", "-".repeat(90));
            for alarm in &alarms {
                println!(
                    "{:<9} | {:<30} | {:<25} | {}",
                    alarm.severity.as_str(),
                    alarm.alarm_name,
                    format!("{} ({})", alarm.entity_name, alarm.entity_type),
                    alarm.time.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        HealthAction::Events { hours, severity } => {
            let events = get_recent_events(session.as_ref(), hours, severity).await?;
            ctx.audit
                .log_query(session.target(), "events", "get_recent_events")
                .await?;
            if events.is_empty() {
                println!("No events at {severity} or above in the last {hours}h");
                return Ok(());
            }
            println!(
                "{:<19} | {:<9} | {:<20} | {:<30} | Message",
                "Time", "Severity", "Entity", "Type"
            );
            println!("{}", "-".repeat(110));
            for event in &events {
                println!(
                    "{:<19} | {:<9} | {:<20} | {:<30} | {}",
                    event.time.format("%Y-%m-%d %H:%M:%S"),
                    event.severity.as_str(),
                    event.entity,
                    event.event_type,
                    event.message
                );
            }
        }
    }
    Ok(())
}

async fn inventory(ctx: &AppContext, target: Option<&str>, action: InventoryAction) -> Result<()> {
    let session = ctx.sessions.connect(target).await?;
    match action {
        InventoryAction::Vms => {
            let vms = ops::inventory::list_vms(session.as_ref()).await?;
            ctx.audit.log_query(session.target(), "vms", "list_vms").await?;
            println!(
                "{:<30} | {:<10} | {:>3} | {:>8} | {:<16} | Host",
                "Name", "Power", "CPU", "Mem (MB)", "IP"
            );
            println!("{}", "-".repeat(95));
            for vm in &vms {
                println!(
                    "{:<30} | {:<10} | {:>3} | {:>8} | {:<16} | {}",
                    vm.name,
                    vm.power_state.to_string(),
                    vm.cpu,
                    vm.memory_mb,
                    vm.ip_address.as_deref().unwrap_or("-"),
                    vm.host.as_deref().unwrap_or("-")
                );
            }
            println!("{} VM(s)", vms.len());
        }
        InventoryAction::Hosts => {
            let hosts = ops::inventory::list_hosts(session.as_ref()).await?;
            ctx.audit
                .log_query(session.target(), "hosts", "list_hosts")
                .await?;
            println!("{:<30} | {:<14} | {:<10} | VMs", "Name", "Connection", "Power");
            println!("{}", "-".repeat(70));
            for host in &hosts {
                println!(
                    "{:<30} | {:<14} | {:<10} | {}",
                    host.name,
                    host.connection_state,
                    host.power_state,
                    host.vm_count.map_or_else(|| "-".to_string(), |n| n.to_string())
                );
            }
            println!("{} host(s)", hosts.len());
        }
    }
    Ok(())
}

async fn vm(ctx: &AppContext, target: Option<&str>, action: VmAction) -> Result<()> {
    let command = match action {
        VmAction::Info { vm } => return vm_info(ctx, target, &vm).await,
        VmAction::SnapshotList { vm } => return snapshot_list(ctx, target, &vm).await,
        VmAction::PowerOn { vm } => LifecycleCommand::PowerOn { vm },
        VmAction::PowerOff { vm, force } => LifecycleCommand::PowerOff { vm, force },
        VmAction::Reset { vm } => LifecycleCommand::Reset { vm },
        VmAction::Suspend { vm } => LifecycleCommand::Suspend { vm },
        VmAction::Create {
            name,
            cpu,
            memory,
            disk,
            network,
            datastore,
            folder,
            guest_id,
        } => LifecycleCommand::CreateVm(CreateVmSpec {
            name,
            cpu,
            memory_mb: memory,
            disk_gb: disk,
            network,
            datastore,
            folder,
            guest_id,
        }),
        VmAction::Delete { vm } => LifecycleCommand::DeleteVm { vm },
        VmAction::Reconfigure { vm, cpu, memory } => LifecycleCommand::ReconfigureVm {
            vm,
            spec: ReconfigureSpec {
                cpu,
                memory_mb: memory,
            },
        },
        VmAction::SnapshotCreate {
            vm,
            name,
            description,
            memory,
        } => LifecycleCommand::CreateSnapshot {
            vm,
            spec: SnapshotSpec {
                name,
                description,
                memory,
            },
        },
        VmAction::SnapshotRevert { vm, name } => LifecycleCommand::RevertSnapshot { vm, snapshot: name },
        VmAction::SnapshotDelete { vm, name, children } => LifecycleCommand::DeleteSnapshot {
            vm,
            snapshot: name,
            remove_children: children,
        },
        VmAction::Clone { vm, new_name } => LifecycleCommand::CloneVm { vm, new_name },
        VmAction::Migrate { vm, host } => LifecycleCommand::MigrateVm { vm, host },
    };

    let runner = ctx.lifecycle(Arc::new(DialoguerPrompter));
    let outcome = runner.run(target, &command).await?;
    match outcome.kind {
        OutcomeKind::Advisory => println!("Note: {}", outcome.message),
        OutcomeKind::Changed | OutcomeKind::NoOp => println!("{}", outcome.message),
    }
    Ok(())
}

async fn vm_info(ctx: &AppContext, target: Option<&str>, vm: &str) -> Result<()> {
    let session = ctx.sessions.connect(target).await?;
    let info = VmOps::new(session.as_ref(), &ctx.waiter).info(vm).await?;
    ctx.audit.log_query(session.target(), vm, "vm_info").await?;

    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    println!("{:<14} {}", "Name:", info.name);
    println!("{:<14} {}", "Power:", info.power_state);
    println!("{:<14} {}", "CPU:", info.cpu);
    println!("{:<14} {} MB", "Memory:", info.memory_mb);
    println!("{:<14} {}", "Guest OS:", opt(&info.guest_os));
    println!("{:<14} {}", "Guest ID:", opt(&info.guest_id));
    println!("{:<14} {}", "UUID:", opt(&info.uuid));
    println!("{:<14} {}", "Host:", opt(&info.host));
    println!("{:<14} {}", "IP:", opt(&info.ip_address));
    println!("{:<14} {}", "Hostname:", opt(&info.hostname));
    println!("{:<14} {}", "Tools:", opt(&info.tools_status));
    if let Some(count) = info.snapshot_count {
        println!("{:<14} {}", "Snapshots:", count);
    }
    if let Some(note) = info.annotation.as_deref().filter(|n| !n.is_empty()) {
        println!("{:<14} {}", "Annotation:", note);
    }
    for disk in &info.disks {
        println!("{:<14} {} ({:.1} GB)", "Disk:", disk.label, disk.size_gb);
    }
    Ok(())
}

async fn snapshot_list(ctx: &AppContext, target: Option<&str>, vm: &str) -> Result<()> {
    let session = ctx.sessions.connect(target).await?;
    let snapshots = VmOps::new(session.as_ref(), &ctx.waiter)
        .list_snapshots(vm)
        .await?;
    ctx.audit
        .log_query(session.target(), vm, "list_snapshots")
        .await?;
    if snapshots.is_empty() {
        println!("No snapshots for '{vm}'");
        return Ok(());
    }
    for snap in &snapshots {
        println!(
            "{}{} [{}] {}",
            "  ".repeat(snap.depth),
            snap.name,
            snap.created.format("%Y-%m-%d %H:%M"),
            snap.description
        );
    }
    Ok(())
}
