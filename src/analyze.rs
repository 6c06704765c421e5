// src/analyze.rs
//! プロジェクト全体のルートツリーを組み立てる。
//!
//! シェルとなるルーティングファイルを解析し、各階層ごとにレジストリを作り、
//! 遅延エントリをすべて materialize して、そのモジュールのルートを子として取り付ける。

use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::cache::ModuleCache;
use crate::error::{AnalyzeError, ConfigError, LoadError};
use crate::model::RouteNode;
use crate::parser::parse_routes_in_file;
use crate::registry::{RouteRegistry, join_namespace};

/// 以下のいずれかにマッチするファイル名をメインルーティング候補とみなす
const ROUTING_FILE_SUFFIXES: &[&str] = &[
    "app-routing.module.ts",
    "app-routing.ts",
    "routing.module.ts",
    "routes.ts",
];

const SKIPPED_DIRS: &[&str] = &["node_modules", "dist", "target", ".git", ".angular"];

/// プロジェクト配下のルーティングファイル候補を列挙する (ソート・重複除去済み)
pub fn discover_routing_files(project_root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(project_root)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|name| ROUTING_FILE_SUFFIXES.iter().any(|s| name.ends_with(s)))
        })
        .map(|e| e.into_path())
        .collect();

    paths.sort();
    paths.dedup();
    paths
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// プロジェクト全体を解析する。
///
/// 他のファイルから遅延ロードされたルーティングファイルはシェルとはみなさず、
/// 結果のトップレベルから除く。
pub async fn analyze_project(project_root: &Path) -> Result<Vec<RouteNode>, AnalyzeError> {
    let project_dir = project_root
        .canonicalize()
        .map_err(|source| AnalyzeError::ProjectRoot {
            path: project_root.to_path_buf(),
            source,
        })?;

    let routing_files = discover_routing_files(&project_dir);
    if routing_files.is_empty() {
        return Err(AnalyzeError::NoRoutingFiles(project_dir));
    }

    let mut shells: Vec<(PathBuf, Vec<RouteNode>)> = Vec::new();
    let mut mounted_files: HashSet<PathBuf> = HashSet::new();
    for routing_path in routing_files {
        info!(file = ?routing_path, "解析中");
        let routes = analyze_file(&routing_path).await?;
        collect_mounted_files(&routes, &routing_path, &mut mounted_files);
        shells.push((routing_path, routes));
    }

    Ok(shells
        .into_iter()
        .filter(|(path, _)| {
            let mounted = mounted_files.contains(path);
            if mounted {
                debug!(file = ?path, "遅延ロード先として取り付け済みのため除外");
            }
            !mounted
        })
        .flat_map(|(_, routes)| routes)
        .collect())
}

/// ひとつのルーティングファイルを起点に、遅延ルートを再帰的に展開する
pub async fn analyze_file(routing_path: &Path) -> Result<Vec<RouteNode>, AnalyzeError> {
    let cache = ModuleCache::new();
    let mut routes = parse_routes_in_file(routing_path)?;
    expand(&cache, &mut routes, String::new(), vec![routing_path.to_path_buf()]).await?;
    debug!(file = ?routing_path, modules = cache.loaded_count(), "展開完了");
    Ok(routes)
}

/// 各階層のレジストリを組み立て、エントリをすべて materialize して子に取り付ける
fn expand<'a>(
    cache: &'a ModuleCache,
    nodes: &'a mut Vec<RouteNode>,
    namespace: String,
    ancestry: Vec<PathBuf>,
) -> BoxFuture<'a, Result<(), AnalyzeError>> {
    async move {
        let registry = RouteRegistry::from_declarations(namespace.clone(), &nodes[..])
            .and_then(|registry| {
                ensure_unique_through_empty_paths(&namespace, &nodes[..])?;
                Ok(registry)
            })
            .map_err(|source| AnalyzeError::Config {
                file: declaring_file(&nodes[..], &ancestry),
                source,
            })?;

        for node in nodes.iter_mut() {
            let nested = child_namespace(&namespace, node.path.as_deref());

            if !node.children.is_empty() {
                expand(cache, &mut node.children, nested.clone(), ancestry.clone())
                    .await?;
            }

            if node.load_children.is_none() {
                continue;
            }
            let Some(entry) = registry.resolve(node.path.as_deref().unwrap_or_default()) else {
                continue;
            };

            let handle = match cache.materialize(entry).await {
                Ok(handle) => handle,
                Err(err @ LoadError::ModuleNotFound { .. }) => {
                    warn!(key = %entry.key(), error = %err, "展開できない loadChildren をスキップ");
                    node.load_error = Some(err.to_string());
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let mut ancestry = ancestry.clone();
            if let Some(file) = handle.source_file() {
                if ancestry.iter().any(|a| a == file) {
                    return Err(LoadError::Cycle(file.to_path_buf()).into());
                }
                ancestry.push(file.to_path_buf());
            }

            let mut mounted = handle.declarations().to_vec();
            expand(cache, &mut mounted, nested, ancestry).await?;
            node.children.extend(mounted);
        }
        Ok(())
    }
    .boxed()
}

/// その階層を宣言しているファイル。空の階層ではエラーにならないので祖先で代用する
fn declaring_file(nodes: &[RouteNode], ancestry: &[PathBuf]) -> PathBuf {
    nodes
        .first()
        .map(|node| node.source_file.clone())
        .or_else(|| ancestry.last().cloned())
        .unwrap_or_default()
}

/// `path: ''` の親は名前空間を変えないので、その子の遅延セグメントも同じ名前空間に並ぶ。
/// 親の階層と合わせて重複が無いことを確認する。
fn ensure_unique_through_empty_paths(
    namespace: &str,
    nodes: &[RouteNode],
) -> Result<(), ConfigError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&RouteNode> = nodes.iter().collect();
    while let Some(node) = pending.pop() {
        let segment = node.path.as_deref().unwrap_or_default();
        if node.is_lazy() {
            if !seen.insert(segment) {
                return Err(ConfigError::DuplicateSegment {
                    namespace: namespace.to_string(),
                    segment: segment.to_string(),
                });
            }
        } else if segment.is_empty() {
            pending.extend(node.children.iter());
        }
    }
    Ok(())
}

fn child_namespace(namespace: &str, path: Option<&str>) -> String {
    match path {
        Some(segment) if !segment.is_empty() => join_namespace(namespace, segment),
        _ => namespace.to_string(),
    }
}

fn collect_mounted_files(routes: &[RouteNode], shell: &Path, out: &mut HashSet<PathBuf>) {
    for route in routes {
        if route.source_file != shell {
            out.insert(route.source_file.clone());
        }
        collect_mounted_files(&route.children, shell, out);
    }
}

/// 遅延ロードせずに、ファイル内の全階層のレジストリを検証する
pub fn check_declarations(
    namespace: &str,
    nodes: &[RouteNode],
) -> Result<Vec<RouteRegistry>, ConfigError> {
    let mut registries = vec![RouteRegistry::from_declarations(namespace, nodes)?];
    ensure_unique_through_empty_paths(namespace, nodes)?;
    for node in nodes {
        if !node.children.is_empty() {
            let nested = child_namespace(namespace, node.path.as_deref());
            registries.extend(check_declarations(&nested, &node.children)?);
        }
    }
    Ok(registries)
}
