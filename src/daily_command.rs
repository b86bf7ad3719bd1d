use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use log::info;

use crate::datetime::{self, parse_date, DateRange};
use crate::recurrence::expand;
use crate::store::{RecordFilter, RecordRepository};
use crate::time_record::Occurrence;

/// 日毎の予定と作業記録を出力するためのサブコマンド。
#[derive(Debug, Default, clap::Args)]
pub struct DailyArgs {
    #[clap(
        short = 'd',
        long = "date",
        help = "Sets a custom date in the format YYYY-MM-DD",
        parse(try_from_str = parse_date),
    )]
    date: Option<NaiveDate>,

    #[clap(long = "week", help = "Show the week (Sunday to Saturday) containing the date")]
    week: bool,

    #[clap(long = "owner", help = "Only show time records of this owner")]
    owner: Option<String>,
}

pub struct DailyCommand<'a, T: RecordRepository, Tz: TimeZone> {
    repository: &'a T,
    company_id: &'a str,
    tz: Tz,
}

impl<'a, T: RecordRepository, Tz: TimeZone> DailyCommand<'a, T, Tz> {
    /// 新しい`DailyCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - 時間記録を取得するためのリポジトリ
    /// * `company_id` - 対象の会社
    /// * `tz` - 日付の境界を判定するタイムゾーン
    pub fn new(repository: &'a T, company_id: &'a str, tz: Tz) -> Self {
        Self {
            repository,
            company_id,
            tz,
        }
    }

    /// `daily`サブコマンドの処理を行う。
    ///
    /// タイムゾーン上で指定された日付の00:00:00から始まる1日(`--week`の場合はその日を含む週)の
    /// 時間記録を取得し、繰り返しを展開して返す。
    /// 日付が指定されていない場合は、タイムゾーン上の現在の日付を利用する。
    ///
    /// # Arguments
    ///
    /// * `daily` - `daily`サブコマンドの引数
    pub fn run(&self, daily: DailyArgs) -> Result<Vec<Occurrence>> {
        let date = daily
            .date
            .unwrap_or_else(|| datetime::now().with_timezone(&self.tz).date_naive());
        let range = if daily.week {
            DateRange::week(&self.tz, date)
        } else {
            DateRange::day(&self.tz, date)
        }
        .with_context(|| format!("Failed to build date range for {}", date))?;
        info!("Start at: {}, End at: {}", range.start, range.end);

        let filter = RecordFilter::company(self.company_id)
            .with_owner(daily.owner)
            .with_window(range);
        let records = self
            .repository
            .read_records(&filter)
            .context("Failed to retrieve time records")?;
        info!("Time records retrieved successfully.");

        Ok(expand(&records, &range, &self.tz))
    }
}
