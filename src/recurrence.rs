use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use log::debug;

use crate::datetime::{resolve_local, week_start, DateRange};
use crate::time_record::{
    Frequency, Occurrence, RecurrenceEnd, TimeRecord, WeeklyRecurrenceRule,
};

/// 繰り返しの最終日。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Terminal {
    Unbounded,
    /// 指定日の終わりまで。
    Through(NaiveDate),
    /// 1回も発生しない。
    Empty,
}

impl Terminal {
    fn admits(&self, date: NaiveDate) -> bool {
        match self {
            Terminal::Unbounded => true,
            Terminal::Through(last) => date <= *last,
            Terminal::Empty => false,
        }
    }
}

/// 時間記録を範囲内の実体に展開する。
///
/// 繰り返しのない記録は範囲と重なる場合にそのまま含める。
/// 週次の繰り返しは範囲内に開始する回のみを生成する。
/// 週次以外の繰り返しは何も生成しない。
///
/// 出力は入力の順、同じ記録の中では開始時刻の昇順になる。
///
/// # Arguments
///
/// * `records` - 展開する時間記録
/// * `range` - 対象の範囲
/// * `tz` - 曜日、日付、時刻を判定するタイムゾーン
pub fn expand<Tz: TimeZone>(
    records: &[TimeRecord],
    range: &DateRange,
    tz: &Tz,
) -> Vec<Occurrence> {
    records
        .iter()
        .flat_map(|record| match &record.repeat_rule {
            None => expand_single(record, range),
            Some(rule) => match &rule.frequency {
                Frequency::Weekly => expand_weekly(record, rule, range, tz),
                Frequency::Unsupported(frequency) => {
                    debug!(
                        "Skip unsupported frequency {:?} of time record {}",
                        frequency, record.id
                    );
                    Vec::new()
                }
            },
        })
        .collect()
}

fn expand_single(record: &TimeRecord, range: &DateRange) -> Vec<Occurrence> {
    if !range.overlaps(record.start, record.end) {
        return Vec::new();
    }

    vec![Occurrence {
        id: record.id.clone(),
        start: record.start,
        end: record.end,
        is_generated: false,
        record: record.clone(),
    }]
}

fn expand_weekly<Tz: TimeZone>(
    record: &TimeRecord,
    rule: &WeeklyRecurrenceRule,
    range: &DateRange,
    tz: &Tz,
) -> Vec<Occurrence> {
    let local_start = record.start.with_timezone(tz);
    let base_date = local_start.date_naive();
    let base_time = local_start.time();
    let duration = record.end - record.start;
    let weekdays = effective_weekdays(rule, base_date);
    let interval = u64::from(rule.interval.max(1));
    let terminal = terminal(rule, &weekdays, base_date);

    let base_week = week_start(base_date);
    let range_week = week_start(range.start.with_timezone(tz).date_naive());
    let last_date = range.end.with_timezone(tz).date_naive();

    // 範囲の週以降で、開始週と同じ周期に乗る最初の週
    let offset_weeks =
        u64::try_from((range_week - base_week).num_days().div_euclid(7)).unwrap_or(0);
    let aligned = offset_weeks.div_ceil(interval).saturating_mul(interval);
    let Some(mut week) = add_weeks(base_week, aligned) else {
        return Vec::new();
    };

    let mut occurrences = Vec::new();
    while week <= last_date && terminal.admits(week) {
        for weekday in &weekdays {
            let Some(date) = week.checked_add_days(Days::new(u64::from(*weekday))) else {
                continue;
            };
            if rule.exception_dates.contains(&date) || !terminal.admits(date) {
                continue;
            }
            let Some(start) = occurrence_start(tz, date, base_time) else {
                continue;
            };
            if start < record.start || start < range.start || start >= range.end {
                continue;
            }
            let Some(end) = start.checked_add_signed(duration) else {
                continue;
            };

            occurrences.push(Occurrence {
                id: format!("{}_{}", record.id, start.to_rfc3339()),
                start,
                end,
                is_generated: true,
                record: record.clone(),
            });
        }
        match add_weeks(week, interval) {
            Some(next) => week = next,
            None => break,
        }
    }

    debug!(
        "Expanded time record {} into {} occurrences",
        record.id,
        occurrences.len()
    );
    occurrences
}

/// 曜日の指定がない場合は開始日の曜日とする。
fn effective_weekdays(rule: &WeeklyRecurrenceRule, base_date: NaiveDate) -> BTreeSet<u32> {
    if rule.by_weekday.is_empty() {
        BTreeSet::from([base_date.weekday().num_days_from_sunday()])
    } else {
        rule.by_weekday.clone()
    }
}

/// 週数を加える。扱える日付の上限を超える場合は`None`を返す。
fn add_weeks(date: NaiveDate, weeks: u64) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(weeks.checked_mul(7)?))
}

/// 終了条件から最終日を求める。
///
/// 回数指定の場合は、展開と同じ順(週の昇順、曜日の昇順)で数えたN回目の日付とする。
/// 除外日も1回として数える。N回目が扱える日付を超える場合は終わりがないものとする。
fn terminal(
    rule: &WeeklyRecurrenceRule,
    weekdays: &BTreeSet<u32>,
    base_date: NaiveDate,
) -> Terminal {
    match rule.end {
        RecurrenceEnd::Never => Terminal::Unbounded,
        RecurrenceEnd::Until(until) => Terminal::Through(until),
        RecurrenceEnd::Count(0) => Terminal::Empty,
        RecurrenceEnd::Count(count) => {
            let interval = u64::from(rule.interval.max(1));
            nth_date(interval, weekdays, base_date, u64::from(count))
                .map_or(Terminal::Unbounded, Terminal::Through)
        }
    }
}

/// 開始日からN回目(1始まり)の日付を週を辿らずに求める。
///
/// 開始週は開始日以降の曜日だけを数え、以降の週は全ての曜日を数える。
fn nth_date(
    interval: u64,
    weekdays: &BTreeSet<u32>,
    base_date: NaiveDate,
    nth: u64,
) -> Option<NaiveDate> {
    let base_weekday = base_date.weekday().num_days_from_sunday();
    let first_week: Vec<u32> = weekdays.range(base_weekday..).copied().collect();
    let first_count = first_week.len() as u64;

    let (week_index, weekday) = if nth <= first_count {
        (0, *first_week.get(usize::try_from(nth - 1).ok()?)?)
    } else {
        let rest = nth - first_count - 1;
        let per_week = weekdays.len() as u64;
        let position = usize::try_from(rest.checked_rem(per_week)?).ok()?;
        (rest / per_week + 1, *weekdays.iter().nth(position)?)
    };

    add_weeks(week_start(base_date), week_index.checked_mul(interval)?)?
        .checked_add_days(Days::new(u64::from(weekday)))
}

fn occurrence_start<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Option<DateTime<Utc>> {
    resolve_local(tz, date.and_time(time))
}
