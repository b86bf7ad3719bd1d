use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use log::info;

use crate::aggregate::{aggregate, OwnerSummary};
use crate::datetime::{self, parse_month, DateRange};
use crate::recurrence::expand;
use crate::store::{active_owners, RecordFilter, RecordRepository};

/// `monthly`サブコマンドの引数を表す構造体。
#[derive(Debug, Default, clap::Args)]
pub struct MonthlyArgs {
    #[clap(
        short = 'm',
        long = "month",
        help = "Sets a custom month in the format YYYY-MM",
        parse(try_from_str = parse_month),
    )]
    month: Option<NaiveDate>,

    #[clap(long = "daily", help = "Show summary by day")]
    daily: bool,

    #[clap(long = "owner", help = "Only count time records of this owner")]
    owner: Option<String>,
}

/// 月毎の集計結果。
#[derive(Debug, PartialEq)]
pub struct MonthlyReport {
    pub range: DateRange,
    pub summaries: Vec<OwnerSummary>,
    /// `--daily`が指定された場合のみ。
    pub days: Option<Vec<(NaiveDate, Vec<OwnerSummary>)>>,
}

pub struct MonthlyCommand<'a, T: RecordRepository, Tz: TimeZone> {
    repository: &'a T,
    company_id: &'a str,
    user_id: Option<&'a str>,
    tz: Tz,
}

impl<'a, T: RecordRepository, Tz: TimeZone> MonthlyCommand<'a, T, Tz> {
    /// 新しい`MonthlyCommand`を返す。
    ///
    /// # Arguments
    /// * `repository` - 時間記録を取得するためのリポジトリ
    /// * `company_id` - 対象の会社
    /// * `user_id` - 集計を要求したユーザー
    /// * `tz` - 日付の境界を判定するタイムゾーン
    pub fn new(repository: &'a T, company_id: &'a str, user_id: Option<&'a str>, tz: Tz) -> Self {
        Self {
            repository,
            company_id,
            user_id,
            tz,
        }
    }

    /// `monthly`サブコマンドの処理を行う。
    ///
    /// タイムゾーン上で指定された月の時間記録を展開し、担当者ごと、かつ案件ごとに集計する。
    /// 在籍中のメンバーと要求したユーザー以外の集計結果は除外する。
    /// 月が指定されていない場合は、タイムゾーン上の現在の月を利用する。
    ///
    /// # Arguments
    ///
    /// * `monthly` - `monthly`サブコマンドの引数
    pub fn run(&self, monthly: MonthlyArgs) -> Result<MonthlyReport> {
        let month = monthly
            .month
            .unwrap_or_else(|| datetime::now().with_timezone(&self.tz).date_naive());
        let range = DateRange::month(&self.tz, month)
            .with_context(|| format!("Failed to build month range for {}", month))?;
        info!("Start at: {}, End at: {}", range.start, range.end);

        let filter = RecordFilter::company(self.company_id)
            .with_owner(monthly.owner)
            .with_window(range);
        let records = self
            .repository
            .read_records(&filter)
            .context("Failed to retrieve time records")?;
        let members = self
            .repository
            .read_members(self.company_id)
            .context("Failed to retrieve members")?;
        info!("Time records retrieved successfully.");

        let owners = active_owners(&members, self.user_id);
        let occurrences = expand(&records, &range, &self.tz);
        let summaries = aggregate(&occurrences, &range)
            .retain_owners(&owners)
            .summaries();

        let days: Option<Vec<_>> = monthly.daily.then(|| {
            range
                .days(&self.tz)
                .into_iter()
                .map(|(date, day)| {
                    let summaries = aggregate(&occurrences, &day)
                        .retain_owners(&owners)
                        .summaries();
                    (date, summaries)
                })
                .collect()
        });

        Ok(MonthlyReport {
            range,
            summaries,
            days,
        })
    }
}
