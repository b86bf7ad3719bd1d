use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::Serialize;

use crate::datetime::DateRange;
use crate::time_record::Occurrence;

type OwnerGroupHours = BTreeMap<String, BTreeMap<String, f64>>;

/// 担当者ごと、かつ案件ごとの集計時間。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HourTotals {
    hours: OwnerGroupHours,
}

/// 案件ごとの時間。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupHours {
    pub group_key: String,
    pub hours: f64,
}

/// 担当者ごとの集計結果。
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    pub owner_id: String,
    pub total_hours: f64,
    /// 時間の降順。
    pub groups: Vec<GroupHours>,
}

/// 範囲と重なる時間を担当者ごと、かつ案件ごとに集計する。
///
/// 範囲の境界を跨ぐ実体は範囲内の部分のみを数える。
/// 案件のない実体は集計対象外とする。
///
/// # Arguments
///
/// * `occurrences` - 集計する実体
/// * `range` - 集計する範囲
pub fn aggregate(occurrences: &[Occurrence], range: &DateRange) -> HourTotals {
    let hours = occurrences.iter().fold(
        OwnerGroupHours::new(),
        |mut accumulate, occurrence| {
            let Some(group_key) = occurrence.group_key() else {
                debug!("Skip occurrence without group: {}", occurrence.id);
                return accumulate;
            };
            let overlap = range.overlap_hours(occurrence.start, occurrence.end);
            if overlap <= 0.0 {
                return accumulate;
            }

            *accumulate
                .entry(occurrence.owner_id().to_string())
                .or_default()
                .entry(group_key.to_string())
                .or_insert(0.0) += overlap;
            accumulate
        },
    );

    HourTotals { hours }
}

impl HourTotals {
    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    /// 担当者の合計時間を返す。
    pub fn owner_total(&self, owner_id: &str) -> f64 {
        self.hours
            .get(owner_id)
            .map(|groups| groups.values().sum())
            .unwrap_or(0.0)
    }

    /// 許可された担当者のみを残す。
    pub fn retain_owners(mut self, active_owners: &HashSet<String>) -> Self {
        self.hours.retain(|owner_id, _| active_owners.contains(owner_id));
        self
    }

    /// 表示用の集計結果を返す。
    ///
    /// 担当者はidの昇順、案件は時間の降順に並べる。
    pub fn summaries(&self) -> Vec<OwnerSummary> {
        self.hours
            .iter()
            .map(|(owner_id, groups)| {
                let mut groups: Vec<GroupHours> = groups
                    .iter()
                    .map(|(group_key, hours)| GroupHours {
                        group_key: group_key.clone(),
                        hours: *hours,
                    })
                    .collect();
                groups.sort_by(|a, b| b.hours.total_cmp(&a.hours));

                OwnerSummary {
                    owner_id: owner_id.clone(),
                    total_hours: self.owner_total(owner_id),
                    groups,
                }
            })
            .collect()
    }
}
