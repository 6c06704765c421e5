// src/loader.rs
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{ConfigError, LoadError};
use crate::model::{LoadChildren, RouteNode};
use crate::parser::parse_routes_in_file;
use crate::registry::RouteRegistry;
use crate::resolver::resolve_load_children_path;

/// ロード済みフィーチャーモジュールへのハンドル。呼び出し元すべてが同じものを共有する
pub type ModuleHandle = Arc<FeatureModule>;

/// 遅延ロードされたフィーチャーモジュール。自分自身のルート宣言を持つ
#[derive(Debug, Serialize)]
pub struct FeatureModule {
    name: String,
    source_file: Option<PathBuf>,
    declarations: Vec<RouteNode>,
}

impl FeatureModule {
    pub fn new(name: impl Into<String>, declarations: Vec<RouteNode>) -> Self {
        Self {
            name: name.into(),
            source_file: None,
            declarations,
        }
    }

    pub fn with_source_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_file = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    pub fn declarations(&self) -> &[RouteNode] {
        &self.declarations
    }

    /// マウント先の名前空間でこのモジュールの遅延ルートを組み立てる
    pub fn registry(&self, namespace: impl Into<String>) -> Result<RouteRegistry, ConfigError> {
        RouteRegistry::from_declarations(namespace, &self.declarations)
    }
}

/// フィーチャーモジュールの取得方法。
/// `load` は materialize されるまで呼ばれてはならず、結果が捨てられても安全であること。
#[async_trait]
pub trait ModuleLoader: Send + Sync + fmt::Debug {
    async fn load(&self) -> Result<ModuleHandle, LoadError>;

    /// ログ用の短い説明
    fn describe(&self) -> String;
}

/// 明示的なファクトリ関数でモジュールを生成するローダー
pub struct FnLoader<F> {
    name: String,
    factory: F,
}

impl<F> FnLoader<F> {
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl<F> fmt::Debug for FnLoader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnLoader").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> ModuleLoader for FnLoader<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ModuleHandle, LoadError>> + Send,
{
    async fn load(&self) -> Result<ModuleHandle, LoadError> {
        (self.factory)().await
    }

    fn describe(&self) -> String {
        format!("fn {}", self.name)
    }
}

/// `import("...")` の指定子からルーティングファイルを探して解析するローダー
#[derive(Debug, Clone)]
pub struct SourceLoader {
    target: LoadChildren,
    parent_file: PathBuf,
}

impl SourceLoader {
    /// - `target`: loadChildren の import 先
    /// - `parent_file`: その loadChildren が書かれているファイル
    pub fn new(target: LoadChildren, parent_file: PathBuf) -> Self {
        Self {
            target,
            parent_file,
        }
    }
}

#[async_trait]
impl ModuleLoader for SourceLoader {
    async fn load(&self) -> Result<ModuleHandle, LoadError> {
        let target = self.target.clone();
        let parent_file = self.parent_file.clone();
        // swc の解析は同期処理なのでブロッキング用スレッドへ逃がす
        let module =
            tokio::task::spawn_blocking(move || load_from_source(&target, &parent_file)).await??;
        Ok(Arc::new(module))
    }

    fn describe(&self) -> String {
        match &self.target.export {
            Some(export) => format!("import(\"{}\").{}", self.target.specifier, export),
            None => format!("import(\"{}\")", self.target.specifier),
        }
    }
}

fn load_from_source(target: &LoadChildren, parent_file: &Path) -> Result<FeatureModule, LoadError> {
    let routing_path = resolve_load_children_path(&target.specifier, parent_file)?.ok_or_else(
        || LoadError::ModuleNotFound {
            specifier: target.specifier.clone(),
            from: parent_file.to_path_buf(),
        },
    )?;
    debug!(specifier = %target.specifier, file = ?routing_path, "モジュールをロード");

    let declarations = parse_routes_in_file(&routing_path)?;
    let name = target.export.clone().unwrap_or_else(|| {
        routing_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| target.specifier.clone())
    });

    Ok(FeatureModule::new(name, declarations).with_source_file(routing_path))
}
