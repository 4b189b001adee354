//! 命令行入口：解析参数、加载配置、初始化日志、分发命令并映射退出码

use crate::commands::search::{run_search, SearchQuery};
use crate::commands::sync::{render_report, run_sync};
use crate::commands::OutputFormat;
use crate::config::AppConfig;
use crate::core::TaskKind;
use crate::error::SyncError;
use crate::logging::{init_logging, LogConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

/// 默认显示条数
const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Parser)]
#[command(
    name = "seedboxsync",
    version,
    about = "Sync torrents and finished downloads with a seedbox"
)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a synchronization
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Query the local history
    #[command(subcommand)]
    Search(SearchCommand),
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum SyncCommand {
    /// Upload torrents from the local blackhole to the seedbox
    Blackhole,
    /// Download finished files from the seedbox
    Seedbox,
}

impl SyncCommand {
    pub fn kind(self) -> TaskKind {
        match self {
            SyncCommand::Blackhole => TaskKind::Blackhole,
            SyncCommand::Seedbox => TaskKind::Download,
        }
    }
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum SearchCommand {
    /// Last torrents uploaded from the blackhole
    Uploaded(SearchArgs),
    /// Last files downloaded from the seedbox
    Downloaded(SearchArgs),
    /// Files currently downloading from the seedbox
    Progress(SearchArgs),
}

impl SearchCommand {
    fn split(self) -> (SearchQuery, u32) {
        match self {
            SearchCommand::Uploaded(args) => (SearchQuery::Uploaded, args.number),
            SearchCommand::Downloaded(args) => (SearchQuery::Downloaded, args.number),
            SearchCommand::Progress(args) => (SearchQuery::Progress, args.number),
        }
    }
}

#[derive(Debug, Clone, Copy, Args)]
pub struct SearchArgs {
    /// Number of entries to display
    #[arg(short = 'n', long = "number", default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub number: u32,
}

impl Command {
    /// 同步命令使用对应任务的日志文件
    fn task_kind(&self) -> Option<TaskKind> {
        match self {
            Command::Sync(cmd) => Some(cmd.kind()),
            Command::Search(_) => None,
        }
    }
}

/// 运行命令并返回进程退出码
pub async fn run(cli: Cli) -> i32 {
    let task = cli.command.task_kind();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let _ = init_logging(&LogConfig::default(), None);
            let e = SyncError::from(e);
            error!("{}", e);
            return e.exit_code();
        }
    };

    if let Err(e) = init_logging(&config.log, task) {
        eprintln!("{e}");
        return e.exit_code();
    }

    match dispatch(config, cli.command, cli.output).await {
        Ok(()) => 0,
        Err(SyncError::AlreadyRunning(kind)) => {
            info!("{} 任务已在运行，本次跳过", kind);
            0
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

async fn dispatch(config: AppConfig, command: Command, output: OutputFormat) -> Result<(), SyncError> {
    match command {
        Command::Sync(cmd) => {
            let report = run_sync(config, cmd.kind()).await?;
            render_report(&report, output)
        }
        Command::Search(cmd) => {
            let (query, limit) = cmd.split();
            run_search(&config, query, limit, output).await
        }
    }
}
