use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub const STORE_ENV: &str = "EFFORT_TALLY_STORE";
pub const COMPANY_ENV: &str = "EFFORT_TALLY_COMPANY";
pub const USER_ENV: &str = "EFFORT_TALLY_USER";

/// 環境変数から読み込む設定。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// ストアからエクスポートしたJSONファイルのパス。
    pub store_path: PathBuf,
    pub company_id: String,
    /// 集計を要求したユーザー。集計対象に常に含める。
    pub user_id: Option<String>,
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// 環境変数`EFFORT_TALLY_COMPANY`が設定されていない場合はエラーを返す。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), dirs::data_dir())
    }

    /// 任意の参照関数から設定を読み込む。
    ///
    /// # Arguments
    ///
    /// * `lookup` - 変数名から値を返す関数
    /// * `data_dir` - ストアのパスが指定されていない場合に利用するディレクトリ
    pub fn from_lookup<F>(lookup: F, data_dir: Option<PathBuf>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store_path = match value(STORE_ENV) {
            Some(path) => PathBuf::from(path),
            None => data_dir
                .map(|dir| dir.join("effort-tally").join("store.json"))
                .with_context(|| format!("{} must be set", STORE_ENV))?,
        };
        let company_id =
            value(COMPANY_ENV).with_context(|| format!("{} must be set", COMPANY_ENV))?;

        Ok(Self {
            store_path,
            company_id,
            user_id: value(USER_ENV),
        })
    }

    /// 要求したユーザーを上書きする。
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        if user_id.is_some() {
            self.user_id = user_id;
        }
        self
    }
}
