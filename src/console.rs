use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::aggregate::OwnerSummary;
use crate::datetime::date_key;
use crate::time_record::Occurrence;

/// Consoleに展開結果と集計結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 展開した実体を表示する。
    ///
    /// # Arguments
    ///
    /// * `occurrences` - 表示する実体
    fn show_occurrences(&mut self, occurrences: &[Occurrence]) -> Result<()>;

    /// 担当者ごとの集計結果を表示する。
    fn show_summaries(&mut self, summaries: &[OwnerSummary]) -> Result<()>;

    /// 日毎の集計結果を表示する。
    fn show_daily_summaries(&mut self, days: &[(NaiveDate, Vec<OwnerSummary>)]) -> Result<()>;
}

/// Markdownのlist形式で表示する。
pub struct ConsoleMarkdownList<'a, W: Write, Tz: TimeZone> {
    writer: &'a mut W,
    tz: Tz,
}

impl<'a, W: Write, Tz: TimeZone> ConsoleMarkdownList<'a, W, Tz> {
    /// 新しい`ConsoleMarkdownList`を返す。
    ///
    /// # Arguments
    ///
    /// * `writer` - 出力先
    /// * `tz` - 時刻を表示するタイムゾーン
    pub fn new(writer: &'a mut W, tz: Tz) -> Self {
        Self { writer, tz }
    }
}

impl<'a, W: Write, Tz: TimeZone> ConsolePresenter for ConsoleMarkdownList<'a, W, Tz>
where
    Tz::Offset: std::fmt::Display,
{
    // 実体を開始時刻の順にlist形式で表示する。末尾に展開元の記録のidを付ける。
    fn show_occurrences(&mut self, occurrences: &[Occurrence]) -> Result<()> {
        let mut sorted = occurrences.to_vec();
        sorted.sort_by_key(|occurrence| occurrence.start);

        for occurrence in sorted {
            let start = occurrence.start.with_timezone(&self.tz);
            let end = occurrence.end.with_timezone(&self.tz);
            writeln!(
                self.writer,
                "- {} ~ {}: {} / {} ({}{})",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%H:%M"),
                occurrence.owner_id(),
                occurrence.group_key().unwrap_or("-"),
                occurrence.base_id(),
                if occurrence.is_generated { ", repeat" } else { "" },
            )
            .with_context(|| format!("Failed to write occurrence: {}", occurrence.id))?;
        }

        Ok(())
    }

    // 担当者ごとに案件の時間を表示する。表示は時間単位で行う。
    fn show_summaries(&mut self, summaries: &[OwnerSummary]) -> Result<()> {
        for summary in summaries {
            writeln!(self.writer, "- {}: {:.2}", summary.owner_id, summary.total_hours)
                .with_context(|| format!("Failed to write summary: {}", summary.owner_id))?;
            for group in &summary.groups {
                writeln!(self.writer, "  - {}: {:.2}", group.group_key, group.hours)
                    .with_context(|| format!("Failed to write group: {}", group.group_key))?;
            }
        }

        Ok(())
    }

    fn show_daily_summaries(&mut self, days: &[(NaiveDate, Vec<OwnerSummary>)]) -> Result<()> {
        for (date, summaries) in days {
            if summaries.is_empty() {
                continue;
            }
            writeln!(self.writer, "## {}", date_key(*date))
                .with_context(|| format!("Failed to write date: {}", date))?;
            self.show_summaries(summaries)?;
        }

        Ok(())
    }
}

/// JSON形式で表示する。
pub struct ConsoleJson<'a, W: Write> {
    writer: &'a mut W,
}

/// 日毎の集計結果のJSON表現。
#[derive(Serialize)]
struct DailySummaries<'a> {
    date: NaiveDate,
    summaries: &'a [OwnerSummary],
}

impl<'a, W: Write> ConsoleJson<'a, W> {
    /// 新しい`ConsoleJson`を返す。
    pub fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }

    fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut *self.writer, value).context("Failed to write json")?;
        writeln!(self.writer).context("Failed to write json")?;
        Ok(())
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleJson<'a, W> {
    fn show_occurrences(&mut self, occurrences: &[Occurrence]) -> Result<()> {
        self.write(occurrences)
    }

    fn show_summaries(&mut self, summaries: &[OwnerSummary]) -> Result<()> {
        self.write(summaries)
    }

    fn show_daily_summaries(&mut self, days: &[(NaiveDate, Vec<OwnerSummary>)]) -> Result<()> {
        let days: Vec<DailySummaries> = days
            .iter()
            .map(|(date, summaries)| DailySummaries {
                date: *date,
                summaries,
            })
            .collect();
        self.write(&days)
    }
}
