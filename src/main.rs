// ABOUTME: CLI entry point for nightscout-ops
// ABOUTME: Parses commands, loads settings, and routes to the command handlers

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use nightscout_ops::commands;
use nightscout_ops::compose::ComposeTemplate;
use nightscout_ops::config::Settings;
use nightscout_ops::interactive::Prompter;
use nightscout_ops::migration::ImportOptions;
use nightscout_ops::validation::ValidationPlan;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nightscout-ops")]
#[command(
    about = "Self-host Nightscout: compose stack, Atlas migration, backups, and tunnel",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to nightscout-ops.toml (also $NIGHTSCOUT_OPS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the compose file and env file
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,
    /// Answer yes to every confirmation and skip interactive selection
    #[arg(short = 'y', long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Tuning {
    /// Collections restored in parallel (mongorestore --numParallelCollections)
    #[arg(long)]
    parallel: Option<u32>,
    /// Insertion workers per collection (mongorestore --numInsertionWorkersPerCollection)
    #[arg(long)]
    workers: Option<u32>,
}

impl Tuning {
    fn parallel_collections(&self, settings: &Settings) -> u32 {
        self.parallel.unwrap_or(settings.mongo.parallel_collections)
    }

    fn insertion_workers(&self, settings: &Settings) -> u32 {
        self.workers.unwrap_or(settings.mongo.insertion_workers)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create, check, and edit the .env file
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
    /// Render and drive the Docker Compose stack
    Compose {
        #[command(subcommand)]
        action: ComposeAction,
    },
    /// Dump the Atlas database to a local directory
    Export {
        /// Atlas connection string (prompted for when omitted)
        #[arg(long)]
        source: Option<String>,
        /// Database name (defaults to the one in the connection string)
        #[arg(long)]
        db: Option<String>,
        #[arg(long, default_value = "export")]
        out: PathBuf,
        /// Only these collections (comma-separated)
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,
    },
    /// Restore a dump directory into the self-hosted database
    Import {
        /// Dump directory for one database, e.g. export/nightscout
        #[arg(long)]
        input: PathBuf,
        /// Target connection string (defaults to mongo.target_uri plus the
        /// env file's root credentials)
        #[arg(long)]
        target: Option<String>,
        /// Database name (defaults to the input directory name)
        #[arg(long)]
        db: Option<String>,
        /// Drop each collection before restoring it
        #[arg(long)]
        drop: bool,
        /// Replay the oplog captured with the dump
        #[arg(long)]
        oplog: bool,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Compare source and target and write a validation report
    Validate {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        db: Option<String>,
        /// Target database name (defaults to --db)
        #[arg(long)]
        target_db: Option<String>,
        /// Skip the Nightscout HTTP status check
        #[arg(long)]
        no_http: bool,
        #[arg(long, default_value = "validation-report.txt")]
        report: PathBuf,
    },
    /// Create, list, prune, and restore backups of the self-hosted database
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Expose Nightscout through a Cloudflare tunnel
    Tunnel {
        #[command(subcommand)]
        action: TunnelAction,
    },
    /// Run the whole migration: export, import, start, validate, tunnel
    Migrate {
        /// Atlas connection string (prompted for when omitted)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        db: Option<String>,
        /// Where the dump is written
        #[arg(long, default_value = "export")]
        work_dir: PathBuf,
        #[arg(long)]
        drop: bool,
        #[arg(long)]
        oplog: bool,
        #[command(flatten)]
        tuning: Tuning,
        #[arg(long, default_value = "validation-report.txt")]
        report: PathBuf,
        /// Include the Cloudflare tunnel setup step
        #[arg(long)]
        tunnel: bool,
        /// Public hostname for the tunnel
        #[arg(long)]
        domain: Option<String>,
    },
    /// Check tools, env file, containers, database, and endpoints
    Diagnose {
        #[arg(long, default_value = "diagnostics.txt")]
        report: PathBuf,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    /// Create the env file with generated secrets
    Init {
        /// Public hostname, used for BASE_URL
        #[arg(long)]
        domain: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate the env file
    Check {
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Set one key, keeping the rest of the file intact
    Set { key: String, value: String },
    /// Print one key's value
    Get { key: String },
    /// Replace API_SECRET with a new random value
    Secret {
        #[arg(long, default_value_t = 32)]
        length: usize,
    },
}

#[derive(Subcommand)]
enum ComposeAction {
    /// Write docker-compose.yml for Nightscout and MongoDB
    Render {
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        mongo_image: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Do not publish MongoDB on localhost
        #[arg(long)]
        no_mongo_port: bool,
        #[arg(long)]
        force: bool,
    },
    /// Start the stack and wait for Nightscout to answer
    Up {
        #[arg(long)]
        no_wait: bool,
        #[arg(long)]
        pull: bool,
    },
    /// Stop the stack
    Down {
        /// Also remove volumes (deletes the database)
        #[arg(long)]
        volumes: bool,
    },
    /// Restart some or all services
    Restart {
        services: Vec<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Show container states
    Ps,
    /// Show service logs
    Logs {
        service: Option<String>,
        #[arg(long, default_value_t = 100)]
        tail: u32,
        #[arg(short, long)]
        follow: bool,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Dump to a timestamped gzip archive with a checksum
    Create {
        /// Connection string to back up (defaults to the self-hosted database)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        db: Option<String>,
        /// Encrypt with openssl using the passphrase env var
        #[arg(long)]
        encrypt: bool,
        /// Keep backups this many days (defaults to backup.retention_days)
        #[arg(long)]
        retention: Option<u32>,
    },
    /// List backups, newest first
    List,
    /// Delete backups older than the retention window
    Prune {
        #[arg(long)]
        retention: Option<u32>,
    },
    /// Restore a backup into the self-hosted database
    Restore {
        /// Backup file (prompted for when omitted)
        file: Option<PathBuf>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        drop: bool,
    },
}

#[derive(Subcommand)]
enum TunnelAction {
    /// Log in, create the tunnel, route DNS, and write the config
    Setup {
        #[arg(long)]
        domain: Option<String>,
    },
    /// Run the tunnel in the foreground
    Run,
    /// Show tunnel connections
    Info,
    /// Delete the tunnel and its config
    Delete,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(dir) = cli.project_dir {
        settings.project_dir = dir;
    }
    let prompter = Prompter::new(cli.yes);

    match cli.command {
        Commands::Env { action } => run_env(&settings, action),
        Commands::Compose { action } => run_compose(&settings, action).await,
        Commands::Export {
            source,
            db,
            out,
            collections,
        } => {
            let source = prompter.secret("Atlas connection string", source.as_deref())?;
            commands::export(&source, db.as_deref(), &out, &collections, prompter).await?;
            Ok(())
        }
        Commands::Import {
            input,
            target,
            db,
            drop,
            oplog,
            tuning,
        } => {
            let database = match db {
                Some(db) => db,
                None => input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| settings.mongo.database.clone()),
            };
            let options = ImportOptions {
                input_dir: input,
                target_uri: match target {
                    Some(target) => target,
                    None => settings.target_uri()?,
                },
                database,
                drop,
                oplog_replay: oplog,
                parallel_collections: tuning.parallel_collections(&settings),
                insertion_workers: tuning.insertion_workers(&settings),
            };
            commands::import(&options, prompter).await
        }
        Commands::Validate {
            source,
            target,
            db,
            target_db,
            no_http,
            report,
        } => {
            let source_db =
                nightscout_ops::mongodb::resolve_database(&source, db.as_deref()).await?;
            let env_path = settings.env_path();
            let env = if env_path.exists() {
                Some(nightscout_ops::envfile::EnvFile::load(&env_path)?)
            } else {
                None
            };
            let plan = ValidationPlan {
                source_uri: source,
                target_db: target_db.unwrap_or_else(|| source_db.clone()),
                source_db,
                target_uri: match target {
                    Some(target) => target,
                    None => settings.target_uri()?,
                },
                status_url: (!no_http).then(|| settings.status_url()),
                env,
            };
            commands::validate(&plan, &report).await?;
            Ok(())
        }
        Commands::Backup { action } => run_backup(&settings, action, prompter).await,
        Commands::Tunnel { action } => match action {
            TunnelAction::Setup { domain } => {
                commands::tunnel::setup(&settings, domain.as_deref(), prompter)?;
                Ok(())
            }
            TunnelAction::Run => commands::tunnel::run(&settings),
            TunnelAction::Info => commands::tunnel::info(&settings),
            TunnelAction::Delete => commands::tunnel::delete(&settings, prompter),
        },
        Commands::Migrate {
            source,
            target,
            db,
            work_dir,
            drop,
            oplog,
            tuning,
            report,
            tunnel,
            domain,
        } => {
            let plan = commands::MigrationPlan {
                source_uri: prompter.secret("Atlas connection string", source.as_deref())?,
                source_db: db,
                target_uri: match target {
                    Some(target) => target,
                    None => settings.target_uri()?,
                },
                work_dir,
                drop,
                oplog_replay: oplog,
                parallel_collections: tuning.parallel_collections(&settings),
                insertion_workers: tuning.insertion_workers(&settings),
                report_path: report,
                setup_tunnel: tunnel,
                domain,
            };
            commands::migrate(&settings, &plan, prompter).await?;
            Ok(())
        }
        Commands::Diagnose { report } => {
            commands::diagnose(&settings, &report).await?;
            Ok(())
        }
    }
}

fn run_env(settings: &Settings, action: EnvAction) -> Result<()> {
    match action {
        EnvAction::Init { domain, force } => {
            commands::env::init(settings, domain.as_deref(), force)
        }
        EnvAction::Check { report } => {
            commands::env::check(settings, report.as_deref())?;
            Ok(())
        }
        EnvAction::Set { key, value } => commands::env::set(settings, &key, &value),
        EnvAction::Get { key } => {
            println!("{}", commands::env::get(settings, &key)?);
            Ok(())
        }
        EnvAction::Secret { length } => {
            commands::env::rotate_secret(settings, length)?;
            Ok(())
        }
    }
}

async fn run_compose(settings: &Settings, action: ComposeAction) -> Result<()> {
    match action {
        ComposeAction::Render {
            image,
            mongo_image,
            port,
            no_mongo_port,
            force,
        } => {
            let mut template = ComposeTemplate {
                env_file: settings.env_file.clone(),
                ..ComposeTemplate::default()
            };
            if let Some(image) = image {
                template.nightscout_image = image;
            }
            if let Some(image) = mongo_image {
                template.mongo_image = image;
            }
            if let Some(port) = port {
                template.app_port = port;
            }
            if no_mongo_port {
                template.mongo_port = None;
            }
            commands::compose::render(settings, &template, force)
        }
        ComposeAction::Up { no_wait, pull } => {
            commands::compose::up(settings, !no_wait, pull).await
        }
        ComposeAction::Down { volumes } => commands::compose::down(settings, volumes),
        ComposeAction::Restart { services, no_wait } => {
            commands::compose::restart(settings, &services, !no_wait).await
        }
        ComposeAction::Ps => commands::compose::ps(settings),
        ComposeAction::Logs {
            service,
            tail,
            follow,
        } => commands::compose::logs(settings, service.as_deref(), tail, follow),
    }
}

async fn run_backup(settings: &Settings, action: BackupAction, prompter: Prompter) -> Result<()> {
    match action {
        BackupAction::Create {
            source,
            db,
            encrypt,
            retention,
        } => {
            let source = match source {
                Some(source) => source,
                None => settings.target_uri()?,
            };
            let database = db.unwrap_or_else(|| settings.mongo.database.clone());
            let path =
                commands::backup::create(settings, &source, &database, encrypt, retention).await?;
            println!("{}", path.display());
            Ok(())
        }
        BackupAction::List => commands::backup::list(&settings.backup_dir()),
        BackupAction::Prune { retention } => {
            commands::backup::prune(
                &settings.backup_dir(),
                retention.unwrap_or(settings.backup.retention_days),
            )?;
            Ok(())
        }
        BackupAction::Restore { file, target, drop } => {
            let target = match target {
                Some(target) => target,
                None => settings.target_uri()?,
            };
            commands::backup::restore(settings, &target, file.as_deref(), drop, prompter).await
        }
    }
}
