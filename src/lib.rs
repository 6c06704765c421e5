//! Angular ルーティングの遅延ロード・レジストリ
//!
//! 親名前空間ごとに「パスセグメント → フィーチャーモジュールのローダー」を順序付きで保持し、
//! ホスト側のキャッシュがナビゲーション時に一度だけモジュールをロードする。
//! 生成ツールが needle の直前へエントリを追記する処理も含む。

pub mod analyze;
pub mod cache;
pub mod error;
pub mod generator;
pub mod loader;
pub mod model;
pub mod parser;
pub mod registry;
pub mod resolver;

pub use cache::ModuleCache;
pub use error::{AnalyzeError, ConfigError, GenerateError, LoadError, ParseError};
pub use loader::{FeatureModule, FnLoader, ModuleHandle, ModuleLoader, SourceLoader};
pub use model::{LoadChildren, RouteData, RouteNode};
pub use registry::{EntryId, RouteEntry, RouteRegistry};
