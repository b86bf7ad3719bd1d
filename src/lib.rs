//! 時間記録の週次の繰り返しを展開し、担当者ごと、かつ案件ごとに時間を集計する。

pub mod aggregate;
pub mod config;
pub mod console;
pub mod daily_command;
pub mod datetime;
pub mod monthly_command;
pub mod recurrence;
pub mod store;
pub mod time_record;

pub use aggregate::{aggregate, GroupHours, HourTotals, OwnerSummary};
pub use datetime::DateRange;
pub use recurrence::expand;
pub use time_record::{
    Frequency, Occurrence, RawTimeRecord, RecurrenceEnd, TimeRecord, WeeklyRecurrenceRule,
};
