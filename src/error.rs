// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// ルート定義そのものの誤り。起動時に検出され、回復はしない。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("名前空間 '{namespace}' に空のパスセグメントは登録できません")]
    EmptySegment { namespace: String },

    #[error("名前空間 '{namespace}' のパスセグメント '{segment}' が不正です: {reason}")]
    InvalidSegment {
        namespace: String,
        segment: String,
        reason: &'static str,
    },

    #[error("名前空間 '{namespace}' にパスセグメント '{segment}' が重複して登録されています")]
    DuplicateSegment { namespace: String, segment: String },

    #[error("パスセグメント '{segment}' の data が不正です: {reason}")]
    MalformedData { segment: String, reason: String },
}

/// TypeScript のルーティングファイル解析に失敗した場合のエラー
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{path:?} を読み込めません: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} の構文解析に失敗しました: {message}")]
    Syntax { path: PathBuf, message: String },
}

/// フィーチャーモジュールのロード失敗。ナビゲーション時に呼び出し元へ返される。
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("'{specifier}' に対応するルーティングファイルが見つかりません ({from:?} から参照)")]
    ModuleNotFound { specifier: String, from: PathBuf },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("モジュールの読み込みで I/O エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0:?} は自分自身を遅延ロードしています")]
    Cycle(PathBuf),

    #[error("ローダーが失敗しました: {0}")]
    Failed(String),

    #[error("ロード用ワーカーが異常終了しました: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// needle への追記処理のエラー
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("{file:?} に needle '{needle}' が見つかりません")]
    MissingNeedle { file: PathBuf, needle: String },

    #[error("{file:?} に needle '{needle}' が {count} 箇所あります")]
    AmbiguousNeedle {
        file: PathBuf,
        needle: String,
        count: usize,
    },

    #[error("{file:?} の needle '{needle}' がルート配列の中にありません")]
    Misplaced { file: PathBuf, needle: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{path:?} への書き込みに失敗しました: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// プロジェクト全体の解析で発生するエラー
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{0:?} の配下にメインのルーティングファイルが見つかりませんでした")]
    NoRoutingFiles(PathBuf),

    #[error("プロジェクトルート {path:?} を解決できません: {source}")]
    ProjectRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file:?}: {source}")]
    Config {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}
