// src/model.rs
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// ルートに付随する静的メタデータ (例: `{ pageTitle: "Pages" }`)。
/// レジストリは中身を解釈せず、そのまま表示層へ渡す。
pub type RouteData = Map<String, Value>;

/// `loadChildren: () => import("./page/page.module").then(m => m.PageModule)` を分解したもの
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadChildren {
    /// `import()` に渡されたモジュール指定子 (例: "./page/page.module")
    pub specifier: String,

    /// `.then(m => m.PageModule)` で取り出すシンボル。`.then` が無ければ None
    pub export: Option<String>,
}

impl LoadChildren {
    pub fn new(specifier: impl Into<String>, export: Option<String>) -> Self {
        Self {
            specifier: specifier.into(),
            export,
        }
    }
}

/// ルーティングファイルから読み取った各ルートの宣言
#[derive(Debug, Clone, Serialize)]
pub struct RouteNode {
    /// ルートのパス (例: "page", "entities", ""(空文字) など)
    pub path: Option<String>,

    /// `data: { ... }` の内容
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: RouteData,

    /// loadChildren の import 先
    pub load_children: Option<LoadChildren>,

    /// このルート定義が書かれているソースファイルへの絶対パス
    pub source_file: PathBuf,

    /// 子ルート (children、または遅延ロードしたモジュールのルート)
    pub children: Vec<RouteNode>,

    /// loadChildren の import 先を展開できなかった理由
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

impl RouteNode {
    /// `data.pageTitle` があれば返す
    pub fn page_title(&self) -> Option<&str> {
        self.data.get("pageTitle").and_then(Value::as_str)
    }

    pub fn is_lazy(&self) -> bool {
        self.load_children.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_title_is_read_from_data() {
        let mut data = RouteData::new();
        data.insert("pageTitle".into(), json!("Pages"));
        let node = RouteNode {
            path: Some("page".into()),
            data,
            load_children: Some(LoadChildren::new("./page/page.module", Some("PageModule".into()))),
            source_file: PathBuf::from("/proj/entity-routing.module.ts"),
            children: Vec::new(),
            load_error: None,
        };

        assert_eq!(node.page_title(), Some("Pages"));
        assert!(node.is_lazy());
    }

    #[test]
    fn empty_data_is_omitted_from_json() {
        let node = RouteNode {
            path: Some("home".into()),
            data: RouteData::new(),
            load_children: None,
            source_file: PathBuf::from("/proj/app-routing.module.ts"),
            children: Vec::new(),
            load_error: None,
        };

        let value = serde_json::to_value(&node).unwrap();
        assert!(value.get("data").is_none());
        assert_eq!(value["path"], json!("home"));
    }
}
