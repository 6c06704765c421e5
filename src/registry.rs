// src/registry.rs
//! 遅延ロードのルートレジストリ。
//!
//! ひとつの親名前空間について、子パスセグメントと、そのセグメントを担当する
//! フィーチャーモジュールの取得方法 ([`ModuleLoader`]) を順序付きで保持する。
//! 登録時にローダーは決して呼ばれない。呼び出すのはホスト側の
//! [`ModuleCache::materialize`](crate::cache::ModuleCache::materialize) だけ。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::loader::{ModuleLoader, SourceLoader};
use crate::model::{RouteData, RouteNode};

/// 登録ごとに払い出すエントリ ID
static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(0);

/// セッション内でエントリを一意に識別する ID。名前空間とセグメントが同じでも別物になる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        EntryId(NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// レジストリ内のひとつのエントリ
#[derive(Clone)]
pub struct RouteEntry {
    id: EntryId,
    key: String,
    path_segment: String,
    data: RouteData,
    loader: Arc<dyn ModuleLoader>,
}

impl RouteEntry {
    /// モジュールキャッシュが引く ID
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// ログ用のキー (`<namespace>/<segment>`)
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path_segment(&self) -> &str {
        &self.path_segment
    }

    pub fn data(&self) -> &RouteData {
        &self.data
    }

    pub fn page_title(&self) -> Option<&str> {
        self.data.get("pageTitle").and_then(|v| v.as_str())
    }

    pub fn loader(&self) -> &Arc<dyn ModuleLoader> {
        &self.loader
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("path_segment", &self.path_segment)
            .field("data", &self.data)
            .field("loader", &self.loader.describe())
            .finish()
    }
}

/// 順序付き・追記のみのルートエントリ列
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    namespace: String,
    entries: Vec<RouteEntry>,
}

impl RouteRegistry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: Vec::new(),
        }
    }

    /// 解析済みのルート宣言からレジストリを組み立てる。
    /// loadChildren を持つ宣言だけがエントリになる。
    pub fn from_declarations(
        namespace: impl Into<String>,
        nodes: &[RouteNode],
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new(namespace);
        for node in nodes {
            let Some(load_children) = &node.load_children else {
                trace!(path = ?node.path, "loadChildren を持たないルートはスキップ");
                continue;
            };
            let segment = node.path.clone().unwrap_or_default();
            let loader = SourceLoader::new(load_children.clone(), node.source_file.clone());
            registry.register(segment, node.data.clone(), Arc::new(loader))?;
        }
        Ok(registry)
    }

    /// エントリを末尾に追加する。ローダーはここでは実行されない。
    pub fn register(
        &mut self,
        path_segment: impl Into<String>,
        data: RouteData,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<(), ConfigError> {
        let path_segment = path_segment.into();
        validate_segment(&self.namespace, &path_segment)?;
        validate_data(&path_segment, &data)?;
        self.ensure_vacant(&path_segment)?;

        debug!(
            namespace = %self.namespace,
            segment = %path_segment,
            loader = %loader.describe(),
            "ルートを登録"
        );
        self.entries.push(RouteEntry {
            id: EntryId::next(),
            key: join_namespace(&self.namespace, &path_segment),
            path_segment,
            data,
            loader,
        });
        Ok(())
    }

    /// セグメントに完全一致するエントリを返す。見つからなければ None (エラーではない)
    pub fn resolve(&self, path_segment: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.path_segment == path_segment)
    }

    /// 別のフラグメントをこの名前空間の下に取り込む。
    /// 重複はここで検査し、ひとつでもあれば何も取り込まずにエラーを返す。
    pub fn merge(&mut self, fragment: RouteRegistry) -> Result<(), ConfigError> {
        for entry in &fragment.entries {
            self.ensure_vacant(&entry.path_segment)?;
        }
        for entry in fragment.entries {
            let key = join_namespace(&self.namespace, &entry.path_segment);
            self.entries.push(RouteEntry { key, ..entry });
        }
        Ok(())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RouteEntry> {
        self.entries.iter()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path_segment.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_vacant(&self, path_segment: &str) -> Result<(), ConfigError> {
        if self.resolve(path_segment).is_some() {
            return Err(ConfigError::DuplicateSegment {
                namespace: self.namespace.clone(),
                segment: path_segment.to_string(),
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RouteRegistry {
    type Item = &'a RouteEntry;
    type IntoIter = std::slice::Iter<'a, RouteEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 子レジストリの名前空間を作る。ルート名前空間 ("") の直下はセグメントそのもの
pub fn join_namespace(namespace: &str, segment: &str) -> String {
    if namespace.is_empty() {
        segment.to_string()
    } else {
        format!("{namespace}/{segment}")
    }
}

/// パスセグメントはひとつのパス要素だけを表す
pub(crate) fn validate_segment(namespace: &str, segment: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidSegment {
        namespace: namespace.to_string(),
        segment: segment.to_string(),
        reason,
    };

    if segment.is_empty() {
        return Err(ConfigError::EmptySegment {
            namespace: namespace.to_string(),
        });
    }
    if segment.contains('/') {
        return Err(invalid("'/' を含めることはできません"));
    }
    if segment.trim() != segment {
        return Err(invalid("前後に空白を含めることはできません"));
    }
    Ok(())
}

fn validate_data(segment: &str, data: &RouteData) -> Result<(), ConfigError> {
    if data.keys().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::MalformedData {
            segment: segment.to_string(),
            reason: "空のキーがあります".into(),
        });
    }
    Ok(())
}
