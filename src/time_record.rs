use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::datetime::{parse_date_key, parse_instant};

/// 繰り返しの頻度。
///
/// 週次以外は展開しないが、データとしては保持する。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Weekly,
    Unsupported(String),
}

impl Frequency {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Frequency::Weekly,
            _ => Frequency::Unsupported(s.to_string()),
        }
    }
}

/// 繰り返しの終了条件。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecurrenceEnd {
    Never,
    /// 指定日を含むまで。
    Until(NaiveDate),
    /// 指定回数まで。
    Count(u32),
}

/// 週次の繰り返しルール。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRecurrenceRule {
    pub frequency: Frequency,
    /// 繰り返す週の間隔(1以上)。
    pub interval: u32,
    /// 0=日曜日..6=土曜日。空の場合は開始日の曜日。
    pub by_weekday: BTreeSet<u32>,
    pub end: RecurrenceEnd,
    pub exception_dates: HashSet<NaiveDate>,
}

impl WeeklyRecurrenceRule {
    /// 毎週、開始日の曜日に無期限で繰り返すルールを返す。
    pub fn weekly() -> Self {
        Self {
            frequency: Frequency::Weekly,
            interval: 1,
            by_weekday: BTreeSet::new(),
            end: RecurrenceEnd::Never,
            exception_dates: HashSet::new(),
        }
    }
}

/// 保存済みの時間記録。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRecord {
    pub id: String,
    pub owner_id: String,
    /// 案件のキー。ない場合は集計対象外。
    pub group_key: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub repeat_rule: Option<WeeklyRecurrenceRule>,
}

impl TimeRecord {
    /// 繰り返しなしの`TimeRecord`を返す。
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        group_key: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            group_key: group_key.map(str::to_string),
            start,
            end: end.max(start),
            repeat_rule: None,
        }
    }

    /// 繰り返しルールを設定した`TimeRecord`を返す。
    pub fn with_rule(mut self, rule: WeeklyRecurrenceRule) -> Self {
        self.repeat_rule = Some(rule);
        self
    }

    /// 永続化層から取得した型の緩いレコードを検証して変換する。
    ///
    /// `id`、`ownerId`、`start`のいずれかが利用できない場合は`None`を返す。
    /// `end`が不正、もしくは`start`以前の場合は長さ0の記録として扱う。
    ///
    /// # Arguments
    ///
    /// * `raw` - 永続化層のレコード
    /// * `tz` - タイムゾーンなしの日時を解釈するタイムゾーン
    pub fn from_raw<Tz: TimeZone>(raw: &RawTimeRecord, tz: &Tz) -> Option<Self> {
        let id = non_empty(raw.id.as_deref())?;
        let Some(owner_id) = non_empty(raw.owner_id.as_deref()) else {
            warn!("Skip time record without owner: {}", id);
            return None;
        };
        let Some(start) = raw.start.as_deref().and_then(|s| parse_instant(tz, s)) else {
            warn!("Skip time record with invalid start: {} ({:?})", id, raw.start);
            return None;
        };
        let end = match raw.end.as_deref().and_then(|s| parse_instant(tz, s)) {
            Some(end) if end > start => end,
            _ => {
                warn!("Time record has invalid end, treat as zero duration: {}", id);
                start
            }
        };

        Some(Self {
            id,
            owner_id,
            group_key: non_empty(raw.group_key.as_deref()),
            start,
            end,
            repeat_rule: raw.repeat_rule.as_ref().map(RawRepeatRule::to_rule),
        })
    }
}

/// 時間記録を展開した1回分の実体。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_generated: bool,
    /// 展開元の記録。
    pub record: TimeRecord,
}

impl Occurrence {
    /// 展開元の記録の`id`を返す。
    pub fn base_id(&self) -> &str {
        &self.record.id
    }

    pub fn owner_id(&self) -> &str {
        &self.record.owner_id
    }

    pub fn group_key(&self) -> Option<&str> {
        self.record.group_key.as_deref()
    }
}

/// 永続化層の時間記録をデシリアライズするための構造体。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTimeRecord {
    pub id: Option<String>,
    pub company_id: Option<String>,
    pub owner_id: Option<String>,
    pub group_key: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub repeat_rule: Option<RawRepeatRule>,
}

/// 永続化層の繰り返しルールをデシリアライズするための構造体。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRepeatRule {
    pub frequency: Option<String>,
    pub interval: Option<i64>,
    pub by_weekday: Option<Vec<i64>>,
    pub end: Option<RawRepeatEnd>,
    pub exception_dates: Option<Vec<String>>,
}

/// 永続化層の繰り返し終了条件をデシリアライズするための構造体。
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRepeatEnd {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub until: Option<String>,
    pub count: Option<i64>,
}

impl RawRepeatRule {
    /// 解釈できない値は既定値に置き換えて変換する。
    fn to_rule(&self) -> WeeklyRecurrenceRule {
        let frequency = self
            .frequency
            .as_deref()
            .map(Frequency::parse)
            .unwrap_or(Frequency::Weekly);
        let interval = self
            .interval
            .filter(|interval| *interval >= 1)
            .and_then(|interval| u32::try_from(interval).ok())
            .unwrap_or(1);
        let by_weekday = self
            .by_weekday
            .iter()
            .flatten()
            .filter_map(|day| u32::try_from(*day).ok())
            .filter(|day| *day <= 6)
            .collect();
        let exception_dates = self
            .exception_dates
            .iter()
            .flatten()
            .filter_map(|key| parse_date_key(key))
            .collect();

        WeeklyRecurrenceRule {
            frequency,
            interval,
            by_weekday,
            end: self
                .end
                .as_ref()
                .map(RawRepeatEnd::to_end)
                .unwrap_or(RecurrenceEnd::Never),
            exception_dates,
        }
    }
}

impl RawRepeatEnd {
    fn to_end(&self) -> RecurrenceEnd {
        match self.kind.as_deref() {
            Some("date") | Some("until") => self
                .until
                .as_deref()
                .and_then(parse_until)
                .map(RecurrenceEnd::Until)
                .unwrap_or(RecurrenceEnd::Never),
            Some("count") => self
                .count
                .map(|count| {
                    RecurrenceEnd::Count(u32::try_from(count.max(0)).unwrap_or(u32::MAX))
                })
                .unwrap_or(RecurrenceEnd::Never),
            _ => RecurrenceEnd::Never,
        }
    }
}

/// 終了日は日付キー、もしくは日時の日付部分として解釈する。
fn parse_until(s: &str) -> Option<NaiveDate> {
    parse_date_key(s).or_else(|| s.get(..10).and_then(parse_date_key))
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
    use rstest::rstest;

    use super::{Frequency, RawTimeRecord, RecurrenceEnd, TimeRecord};

    fn raw(json: &str) -> RawTimeRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_from_raw_full_record() {
        let record = TimeRecord::from_raw(
            &raw(r#"{
                "id": "r1",
                "companyId": "acme",
                "ownerId": "alice",
                "groupKey": "deal-1",
                "start": "2024-03-04T09:00:00Z",
                "end": "2024-03-04T10:00:00Z",
                "repeatRule": {
                    "frequency": "weekly",
                    "interval": 2,
                    "byWeekday": [1, 3],
                    "end": {"type": "count", "count": 5},
                    "exceptionDates": ["2024-03-18", "bogus"]
                }
            }"#),
            &Utc,
        )
        .unwrap();

        assert_eq!(record.id, "r1");
        assert_eq!(record.group_key.as_deref(), Some("deal-1"));
        assert_eq!(record.end - record.start, chrono::Duration::hours(1));
        let rule = record.repeat_rule.unwrap();
        assert_eq!(rule.frequency, Frequency::Weekly);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.by_weekday.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(rule.end, RecurrenceEnd::Count(5));
        assert_eq!(rule.exception_dates.len(), 1);
    }

    #[rstest]
    #[case::missing_id(r#"{"ownerId": "a", "start": "2024-03-04T09:00:00Z"}"#)]
    #[case::missing_owner(r#"{"id": "r", "start": "2024-03-04T09:00:00Z"}"#)]
    #[case::invalid_start(r#"{"id": "r", "ownerId": "a", "start": "yesterday"}"#)]
    fn test_from_raw_rejects(#[case] json: &str) {
        assert!(TimeRecord::from_raw(&raw(json), &Utc).is_none());
    }

    /// `end`が不正な場合は長さ0として扱うことを確認する。
    #[rstest]
    #[case::invalid_end(
        r#"{"id": "r", "ownerId": "a", "start": "2024-03-04T09:00:00Z", "end": "?"}"#
    )]
    #[case::end_before_start(
        r#"{"id": "r", "ownerId": "a",
            "start": "2024-03-04T09:00:00Z", "end": "2024-03-04T08:00:00Z"}"#
    )]
    #[case::missing_end(r#"{"id": "r", "ownerId": "a", "start": "2024-03-04T09:00:00Z"}"#)]
    fn test_from_raw_zero_duration(#[case] json: &str) {
        let record = TimeRecord::from_raw(&raw(json), &Utc).unwrap();

        assert_eq!(record.start, record.end);
    }

    #[test]
    fn test_from_raw_naive_time_uses_time_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let record = TimeRecord::from_raw(
            &raw(r#"{"id": "r", "ownerId": "a",
                     "start": "2024-03-04T09:00", "end": "2024-03-04T10:00"}"#),
            &tokyo,
        )
        .unwrap();

        assert_eq!(record.start, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
    }

    #[rstest]
    #[case::interval_zero(r#"{"interval": 0}"#, 1)]
    #[case::interval_negative(r#"{"interval": -3}"#, 1)]
    #[case::interval_missing(r#"{}"#, 1)]
    #[case::interval_three(r#"{"interval": 3}"#, 3)]
    fn test_rule_interval_defaults(#[case] rule_json: &str, #[case] expected: u32) {
        let json = format!(
            r#"{{"id": "r", "ownerId": "a", "start": "2024-03-04T09:00:00Z", "repeatRule": {}}}"#,
            rule_json
        );
        let record = TimeRecord::from_raw(&raw(&json), &Utc).unwrap();

        assert_eq!(record.repeat_rule.unwrap().interval, expected);
    }

    #[rstest]
    #[case::until_date(
        r#"{"type": "date", "until": "2024-03-31"}"#,
        RecurrenceEnd::Until(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
    )]
    #[case::until_datetime(
        r#"{"type": "until", "until": "2024-03-31T00:00:00Z"}"#,
        RecurrenceEnd::Until(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
    )]
    #[case::count(r#"{"type": "count", "count": 3}"#, RecurrenceEnd::Count(3))]
    #[case::never(r#"{"type": "never"}"#, RecurrenceEnd::Never)]
    #[case::broken_until(r#"{"type": "date", "until": "soon"}"#, RecurrenceEnd::Never)]
    fn test_rule_end(#[case] end_json: &str, #[case] expected: RecurrenceEnd) {
        let json = format!(
            r#"{{"id": "r", "ownerId": "a", "start": "2024-03-04T09:00:00Z",
                 "repeatRule": {{"end": {}}}}}"#,
            end_json
        );
        let record = TimeRecord::from_raw(&raw(&json), &Utc).unwrap();

        assert_eq!(record.repeat_rule.unwrap().end, expected);
    }

    #[test]
    fn test_rule_unsupported_frequency_is_kept() {
        let record = TimeRecord::from_raw(
            &raw(r#"{"id": "r", "ownerId": "a", "start": "2024-03-04T09:00:00Z",
                     "repeatRule": {"frequency": "monthly"}}"#),
            &Utc,
        )
        .unwrap();

        assert_eq!(
            record.repeat_rule.unwrap().frequency,
            Frequency::Unsupported("monthly".to_string())
        );
    }
}
