//! アプリケーション設定
//!
//! 既定値 → YAML ファイル → 環境変数 (`INCIDENT_QA_*`) の順で上書きする。

use color_eyre::{Result, eyre::WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// 推論バックエンドの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Ollama,
    OpenAI,
}

impl FromStr for Backend {
    type Err = color_eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Backend::Ollama),
            "openai" => Ok(Backend::OpenAI),
            other => Err(color_eyre::eyre::eyre!("unknown backend: {other}")),
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 推論バックエンド
    pub backend: Backend,
    /// モデル名
    pub model: String,
    /// Ollama サーバのベースURL
    pub ollama_url: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    /// 最大トークン数
    pub max_tokens: u32,
    /// システムプロンプトのバリアント名
    pub prompt_variant: String,
    /// データセットCSVのパス
    pub csv_path: PathBuf,
    /// オープンデータAPIのCSVエンドポイント
    pub data_url: String,
    /// 取得時の1バッチあたりの件数
    pub fetch_batch_size: usize,
    /// HTTPリクエストのタイムアウト（秒）
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Ollama,
            model: "llama3.2:3b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
            // NOTE: Keep in sync with tests (tests/config_tests.rs).
            max_tokens: 2048,
            prompt_variant: "tool_use_v1".to_string(),
            csv_path: PathBuf::from("./knowledge_base/Homicides_2001_to_present.csv"),
            data_url: "https://data.cityofchicago.org/api/v3/views/iyvd-p5ga/query.csv".to_string(),
            fetch_batch_size: 10_000,
            request_timeout_secs: 120,
        }
    }
}

impl Config {
    /// 新しい設定インスタンスを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// YAML ファイルから読み込む（欠けている項目は既定値）
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .wrap_err_with(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// `.env` を読み込んだ上で環境変数を既定値に適用する
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    /// `INCIDENT_QA_*` 環境変数で上書き
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(env_var)
    }

    /// `lookup` が返す `INCIDENT_QA_*` の値で上書きする（空文字は未設定扱い）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("INCIDENT_QA_BACKEND") {
            self.backend = v.parse()?;
        }
        if let Some(v) = get("INCIDENT_QA_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("INCIDENT_QA_OLLAMA_URL") {
            self.ollama_url = v;
        }
        if let Some(v) = get("INCIDENT_QA_TEMPERATURE") {
            self.temperature = v.trim().parse().wrap_err("INCIDENT_QA_TEMPERATURE")?;
        }
        if let Some(v) = get("INCIDENT_QA_TOP_P") {
            self.top_p = v.trim().parse().wrap_err("INCIDENT_QA_TOP_P")?;
        }
        if let Some(v) = get("INCIDENT_QA_REPEAT_PENALTY") {
            self.repeat_penalty = v.trim().parse().wrap_err("INCIDENT_QA_REPEAT_PENALTY")?;
        }
        if let Some(v) = get("INCIDENT_QA_MAX_TOKENS") {
            self.max_tokens = v.trim().parse().wrap_err("INCIDENT_QA_MAX_TOKENS")?;
        }
        if let Some(v) = get("INCIDENT_QA_PROMPT_VARIANT") {
            self.prompt_variant = v;
        }
        if let Some(v) = get("INCIDENT_QA_CSV_PATH") {
            self.csv_path = PathBuf::from(v);
        }
        if let Some(v) = get("INCIDENT_QA_DATA_URL") {
            self.data_url = v;
        }
        if let Some(v) = get("INCIDENT_QA_FETCH_BATCH_SIZE") {
            self.fetch_batch_size = v.trim().parse().wrap_err("INCIDENT_QA_FETCH_BATCH_SIZE")?;
        }
        if let Some(v) = get("INCIDENT_QA_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v.trim().parse().wrap_err("INCIDENT_QA_REQUEST_TIMEOUT_SECS")?;
        }
        debug!(target: "config", backend = ?self.backend, model = %self.model, variant = %self.prompt_variant, "config_resolved");
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
