use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::TimeZone;
use log::{info, warn};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datetime::DateRange;
use crate::time_record::{RawTimeRecord, TimeRecord};

/// 会社に所属するメンバー。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub company_id: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// 集計対象の担当者を返す。
///
/// 在籍中のメンバーと、集計を要求したユーザーを対象とする。
pub fn active_owners(members: &[Member], user_id: Option<&str>) -> HashSet<String> {
    members
        .iter()
        .filter(|member| member.active)
        .map(|member| member.id.clone())
        .chain(user_id.map(str::to_string))
        .collect()
}

/// 時間記録を取得する条件。
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub company_id: String,
    pub owner_id: Option<String>,
    pub window: Option<DateRange>,
}

impl RecordFilter {
    /// 会社の全ての時間記録を対象とする`RecordFilter`を返す。
    pub fn company(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }

    pub fn with_window(mut self, window: DateRange) -> Self {
        self.window = Some(window);
        self
    }

    /// 担当者と期間の条件に一致するかを返す。
    ///
    /// 繰り返しのある記録は、期間の終わりより前に始まっていれば対象とする。
    fn matches(&self, record: &TimeRecord) -> bool {
        if let Some(owner_id) = &self.owner_id {
            if &record.owner_id != owner_id {
                return false;
            }
        }
        match &self.window {
            None => true,
            Some(window) if record.repeat_rule.is_some() => record.start < window.end,
            Some(window) => window.overlaps(record.start, record.end),
        }
    }
}

/// 時間記録を保持する外部ストアとやり取りするためのtrait。
#[cfg_attr(test, automock)]
pub trait RecordRepository {
    /// 条件に一致する時間記録を取得する。
    ///
    /// # Arguments
    ///
    /// * `filter` - 取得する条件
    fn read_records(&self, filter: &RecordFilter) -> Result<Vec<TimeRecord>>;

    /// 会社のメンバーを取得する。
    fn read_members(&self, company_id: &str) -> Result<Vec<Member>>;
}

/// ストアからエクスポートしたJSONファイル。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoreExport {
    members: Vec<Value>,
    time_records: Vec<Value>,
}

/// JSONファイルから時間記録を読み込むリポジトリ。
///
/// # Examples
///
/// ```ignore
/// let repository = JsonFileRepository::open("store.json", Local)?;
/// let records = repository.read_records(&RecordFilter::company("acme"))?;
/// ```
pub struct JsonFileRepository<Tz: TimeZone> {
    path: PathBuf,
    export: StoreExport,
    tz: Tz,
}

impl<Tz: TimeZone> JsonFileRepository<Tz> {
    /// ファイルを読み込んで新しい`JsonFileRepository`を返す。
    ///
    /// # Arguments
    ///
    /// * `path` - エクスポートしたJSONファイルのパス
    /// * `tz` - タイムゾーンなしの日時を解釈するタイムゾーン
    pub fn open(path: impl AsRef<Path>, tz: Tz) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read store file: {}", path.display()))?;
        let mut repository = Self::from_json(&contents, tz)
            .with_context(|| format!("Failed to parse store file: {}", path.display()))?;
        repository.path = path;

        Ok(repository)
    }

    /// JSON文字列から新しい`JsonFileRepository`を返す。
    pub fn from_json(contents: &str, tz: Tz) -> Result<Self> {
        let export: StoreExport =
            serde_json::from_str(contents).context("Failed to deserialize store export")?;
        info!(
            "Store export has {} members and {} time records",
            export.members.len(),
            export.time_records.len()
        );

        Ok(Self {
            path: PathBuf::new(),
            export,
            tz,
        })
    }
}

impl<Tz: TimeZone> RecordRepository for JsonFileRepository<Tz> {
    fn read_records(&self, filter: &RecordFilter) -> Result<Vec<TimeRecord>> {
        let records: Vec<TimeRecord> = self
            .export
            .time_records
            .iter()
            .filter_map(|value| {
                serde_json::from_value::<RawTimeRecord>(value.clone())
                    .map_err(|err| {
                        warn!(
                            "Skip undecodable time record in {}: {}",
                            self.path.display(),
                            err
                        )
                    })
                    .ok()
            })
            .filter(|raw| raw.company_id.as_deref() == Some(filter.company_id.as_str()))
            .filter_map(|raw| TimeRecord::from_raw(&raw, &self.tz))
            .filter(|record| filter.matches(record))
            .collect();
        info!("length of time records: {}", records.len());

        Ok(records)
    }

    fn read_members(&self, company_id: &str) -> Result<Vec<Member>> {
        let members = self
            .export
            .members
            .iter()
            .filter_map(|value| {
                serde_json::from_value::<Member>(value.clone())
                    .map_err(|err| {
                        warn!(
                            "Skip undecodable member in {}: {}",
                            self.path.display(),
                            err
                        )
                    })
                    .ok()
            })
            .filter(|member| member.company_id == company_id)
            .collect();

        Ok(members)
    }
}
