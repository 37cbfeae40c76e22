use burn::config::ConfigError;
use burn::record::RecorderError;
use thiserror::Error;

/// ライブラリ全体で使用するエラー型。
#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("変数 '{0}' は空間に含まれていません")]
    UnknownVariable(String),

    #[error("空間が一致しません: {expected} と {found}")]
    SpaceMismatch { expected: String, found: String },

    #[error("形状が一致しません: {0}")]
    ShapeMismatch(String),

    #[error("不正な領域です: {0}")]
    InvalidDomain(String),

    #[error("サンプリングに失敗しました: {0}")]
    Sampling(String),

    #[error("学習が発散しました (ステップ {step})")]
    Diverged { step: usize },

    #[error("設定ファイルの読み込みに失敗しました: {0:?}")]
    Config(ConfigError),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("モデルの保存・読み込みに失敗しました: {0}")]
    Record(#[from] RecorderError),

    #[error("グラフの描画に失敗しました: {0}")]
    Plot(String),

    #[error("CSVの書き込みに失敗しました: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSONの書き込みに失敗しました: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ConfigError> for PhysicsError {
    fn from(err: ConfigError) -> Self {
        PhysicsError::Config(err)
    }
}

pub type Result<T> = std::result::Result<T, PhysicsError>;
