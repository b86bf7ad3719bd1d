use std::io;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

use effort_tally::config::Config;
use effort_tally::console::{ConsoleJson, ConsoleMarkdownList, ConsolePresenter};
use effort_tally::daily_command::{DailyArgs, DailyCommand};
use effort_tally::monthly_command::{MonthlyArgs, MonthlyCommand};
use effort_tally::store::JsonFileRepository;

/// 時間記録の繰り返しを展開し、作業時間を集計するCLIアプリケーション。
///
/// # Examples
/// ```text
/// $ cargo run -- daily --week
/// $ cargo run -- monthly -m 2024-03 --daily
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(subcommand)]
    subcommand: SubCommands,

    #[clap(short = 'v', long = "verbose", global = true, help = "Show debug logs")]
    verbose: bool,

    #[clap(long = "json", global = true, help = "Print the result as JSON")]
    json: bool,

    #[clap(long = "user", global = true, help = "Requesting user, always included in totals")]
    user: Option<String>,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    Daily(DailyArgs),
    Monthly(MonthlyArgs),
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logger(if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    })?;

    let config = Config::from_env()
        .context("Failed to load configuration")?
        .with_user(args.user);
    let repository = JsonFileRepository::open(&config.store_path, Local)
        .context("Failed to open time record store")?;

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    if args.json {
        run(args.subcommand, &config, &repository, &mut ConsoleJson::new(&mut writer))
    } else {
        run(
            args.subcommand,
            &config,
            &repository,
            &mut ConsoleMarkdownList::new(&mut writer, Local),
        )
    }
}

/// サブコマンドを実行し、結果を表示する。
fn run<P: ConsolePresenter>(
    subcommand: SubCommands,
    config: &Config,
    repository: &JsonFileRepository<Local>,
    presenter: &mut P,
) -> Result<()> {
    match subcommand {
        SubCommands::Daily(daily) => {
            let occurrences = DailyCommand::new(repository, &config.company_id, Local)
                .run(daily)
                .context("Failed to run daily command")?;
            presenter.show_occurrences(&occurrences)?;
        }
        SubCommands::Monthly(monthly) => {
            let report = MonthlyCommand::new(
                repository,
                &config.company_id,
                config.user_id.as_deref(),
                Local,
            )
            .run(monthly)
            .context("Failed to run monthly command")?;
            match report.days {
                Some(days) => presenter.show_daily_summaries(&days)?,
                None => presenter.show_summaries(&report.summaries)?,
            }
        }
    }

    Ok(())
}

/// ログの出力先と形式を設定する。
fn setup_logger(level: LevelFilter) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("Failed to set up logger")?;

    Ok(())
}
