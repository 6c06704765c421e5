// src/cache.rs
//! ホスト側のモジュールキャッシュ。
//!
//! エントリごとに高々一度だけローダーを実行し、得られたハンドルを共有する。
//! 同じエントリへの同時ナビゲーションは、先行するロードの完了を待つ。

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::loader::ModuleHandle;
use crate::registry::{EntryId, RouteEntry};

#[derive(Debug, Default, Clone)]
pub struct ModuleCache {
    slots: Arc<DashMap<EntryId, Arc<OnceCell<ModuleHandle>>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// エントリのローダーを実行してモジュールを得る。ロード済みならキャッシュを返す。
    ///
    /// 失敗はキャッシュされず、その呼び出し元へ返る。自動リトライはしない。
    pub async fn materialize(&self, entry: &RouteEntry) -> Result<ModuleHandle, LoadError> {
        // DashMap のロックを保持したまま await しないよう、スロットだけ取り出す
        let slot = self
            .slots
            .entry(entry.id())
            .or_default()
            .value()
            .clone();

        let handle = slot
            .get_or_try_init(|| async {
                debug!(key = %entry.key(), loader = %entry.loader().describe(), "ロード開始");
                entry.loader().load().await.inspect_err(|err| {
                    warn!(key = %entry.key(), error = %err, "モジュールのロードに失敗");
                })
            })
            .await?;

        Ok(handle.clone())
    }

    /// ロード済みかどうか
    pub fn is_loaded(&self, entry: &RouteEntry) -> bool {
        self.slots
            .get(&entry.id())
            .is_some_and(|slot| slot.initialized())
    }

    pub fn loaded_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{FeatureModule, FnLoader, ModuleLoader};
    use crate::model::RouteData;
    use crate::registry::RouteRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn slow_loader(calls: Arc<AtomicUsize>) -> Arc<dyn ModuleLoader> {
        Arc::new(FnLoader::new("PageModule", move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, LoadError>(Arc::new(FeatureModule::new("PageModule", Vec::new())))
            }
        }))
    }

    fn page_registry(loader: Arc<dyn ModuleLoader>) -> RouteRegistry {
        let mut registry = RouteRegistry::new("entities");
        registry.register("page", RouteData::new(), loader).unwrap();
        registry
    }

    #[tokio::test]
    async fn concurrent_materialize_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = page_registry(slow_loader(calls.clone()));
        let entry = registry.resolve("page").unwrap();
        let cache = ModuleCache::new();

        let (first, second) = tokio::join!(cache.materialize(entry), cache.materialize(entry));
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "PageModule");
        assert!(cache.is_loaded(entry));
    }

    #[tokio::test]
    async fn concurrent_materialize_across_tasks_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(page_registry(slow_loader(calls.clone())));
        let cache = ModuleCache::new();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let entry = registry.resolve("page").unwrap();
                cache.materialize(entry).await.unwrap()
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.loaded_count(), 1);
    }

    #[tokio::test]
    async fn failed_load_is_reported_and_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader: Arc<dyn ModuleLoader> = Arc::new(FnLoader::new("Flaky", move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(LoadError::Failed("chunk の取得に失敗".into()))
                } else {
                    Ok(Arc::new(FeatureModule::new("Flaky", Vec::new())))
                }
            }
        }));
        let registry = page_registry(loader);
        let entry = registry.resolve("page").unwrap();
        let cache = ModuleCache::new();

        let err = cache.materialize(entry).await.unwrap_err();
        assert!(matches!(err, LoadError::Failed(_)));
        assert!(!cache.is_loaded(entry));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 次のナビゲーションで改めてロードされる
        let handle = cache.materialize(entry).await.unwrap();
        assert_eq!(handle.name(), "Flaky");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn same_namespace_and_segment_in_two_registries_load_separately() {
        let named = |name: &'static str| -> Arc<dyn ModuleLoader> {
            Arc::new(FnLoader::new(name, move || async move {
                Ok::<_, LoadError>(Arc::new(FeatureModule::new(name, Vec::new())))
            }))
        };
        let first = page_registry(named("AModule"));
        let second = page_registry(named("BModule"));
        let (a, b) = (first.resolve("page").unwrap(), second.resolve("page").unwrap());
        assert_eq!(a.key(), b.key());
        let cache = ModuleCache::new();

        assert_eq!(cache.materialize(a).await.unwrap().name(), "AModule");
        assert_eq!(cache.materialize(b).await.unwrap().name(), "BModule");
        assert_eq!(cache.loaded_count(), 2);
    }

    #[tokio::test]
    async fn dropped_navigation_does_not_poison_the_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = page_registry(slow_loader(calls.clone()));
        let entry = registry.resolve("page").unwrap();
        let cache = ModuleCache::new();

        let superseded =
            tokio::time::timeout(Duration::from_millis(1), cache.materialize(entry)).await;
        assert!(superseded.is_err());
        assert!(!cache.is_loaded(entry));

        let handle = cache.materialize(entry).await.unwrap();
        assert_eq!(handle.name(), "PageModule");
        assert!(cache.is_loaded(entry));
    }
}
