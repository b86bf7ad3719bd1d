use anyhow::{Context, Result};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};

/// 日付キーのフォーマット。
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

#[cfg(not(test))]
/// 現在のUTC時間を取得する。
pub fn now() -> DateTime<Utc> {
    Utc::now()
}


#[cfg(test)]
pub use mock_datetime::now;

/// `[start, end)`の半開区間。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// 新しい`DateRange`を返す。
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// 指定したタイムゾーンで`date`の00:00:00から始まる1日を返す。
    pub fn day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<Self> {
        let start = start_of_day(tz, date)?;
        let end = start_of_day(tz, date.succ_opt()?)?;
        Some(Self::new(start, end))
    }

    /// `date`を含む日曜始まりの1週間を返す。
    pub fn week<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<Self> {
        let first = week_start(date);
        let start = start_of_day(tz, first)?;
        let end = start_of_day(tz, first + Duration::days(7))?;
        Some(Self::new(start, end))
    }

    /// `date`を含む1ヶ月を返す。
    pub fn month<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<Self> {
        let first = date.with_day(1)?;
        let next = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
        };
        Some(Self::new(start_of_day(tz, first)?, start_of_day(tz, next)?))
    }

    /// `[start, end)`が範囲と重なるかを返す。
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end > self.start && start < self.end
    }

    /// `[start, end)`と範囲の重なりを時間単位で返す。
    ///
    /// 重なりがない場合は0を返す。
    pub fn overlap_hours(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        let clipped_start = start.max(self.start);
        let clipped_end = end.min(self.end);
        let millis = (clipped_end - clipped_start).num_milliseconds().max(0);
        millis as f64 / 3_600_000.0
    }

    /// 範囲をタイムゾーン上の1日ごとに分割する。
    ///
    /// 先頭と末尾の日は範囲で切り詰める。
    pub fn days<Tz: TimeZone>(&self, tz: &Tz) -> Vec<(NaiveDate, DateRange)> {
        let mut days = Vec::new();
        if self.end <= self.start {
            return days;
        }
        let mut date = self.start.with_timezone(tz).date_naive();
        while let Some(day) = Self::day(tz, date) {
            if day.start >= self.end {
                break;
            }
            days.push((
                date,
                Self::new(day.start.max(self.start), day.end.min(self.end)),
            ));
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        days
    }
}

/// 日付キー("YYYY-MM-DD")を返す。
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// `date`を含む週の日曜日を返す。
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// タイムゾーン上の壁時計時刻をUTCに変換する。
///
/// 夏時間で重複する時刻は早い方とする。
/// 夏時間の開始で存在しない時刻は、切り替わりで飛ばされた分だけ後ろにずらす。
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(datetime) | LocalResult::Ambiguous(datetime, _) => {
            Some(datetime.with_timezone(&Utc))
        }
        LocalResult::None => {
            // 切り替わり前のオフセットで解釈すると、飛ばされた分だけ後ろの時刻になる
            let before = tz
                .offset_from_utc_datetime(&local.checked_sub_signed(Duration::days(1))?)
                .fix();
            let utc = local.checked_sub_signed(Duration::seconds(i64::from(
                before.local_minus_utc(),
            )))?;
            Some(utc.and_utc())
        }
    }
}

/// タイムゾーン上の`date`の00:00:00を返す。
pub fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    resolve_local(tz, date.and_hms_opt(0, 0, 0)?)
}

/// 日時文字列をパースする。
///
/// RFC 3339形式に加え、タイムゾーンなしの形式はタイムゾーン上の時刻として解釈する。
pub fn parse_instant<Tz: TimeZone>(tz: &Tz, s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(s) {
        return Some(datetime.to_utc());
    }

    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
    .and_then(|local| resolve_local(tz, local))
}

/// 日付キーをパースする。
pub fn parse_date_key(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_KEY_FORMAT).ok()
}

/// 日付をパースする。
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_KEY_FORMAT)
        .with_context(|| format!("Failed to parse date: {}", s))
}

/// 月をパースする。
pub fn parse_month(s: &str) -> Result<NaiveDate> {
    let target_date = s.to_string() + "-01";
    NaiveDate::parse_from_str(&target_date, DATE_KEY_FORMAT)
        .with_context(|| format!("Failed to parse month: {}", s))
}
