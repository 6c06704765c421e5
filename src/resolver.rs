use path_absolutize::Absolutize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// loadChildren の `import("...")` 指定子を、親ファイル (`parent_file`) のディレクトリを
/// 基準にして実際の routing ファイル (.ts) へ解決する関数。
///
/// - `specifier`: import に渡された指定子 (例: "./page/page.module")
/// - `parent_file`: その loadChildren を持つ親ファイルのパス (例: `/proj/src/app/entities/entity-routing.module.ts`)
///
/// 戻り値:
/// - Ok(Some(path)) → 見つかった routing ファイルの絶対パス
/// - Ok(None)       → 見つからなかった、またはパッケージ指定子で追跡できない
pub fn resolve_load_children_path(
    specifier: &str,
    parent_file: &Path,
) -> io::Result<Option<PathBuf>> {
    // 1) 相対指定子だけを扱う ("@scope/pkg" のようなパッケージは対象外)
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return Ok(None);
    }

    // 2) parent_file の親ディレクトリを基準にして相対パスを結合
    //    例: parent_file = /proj/src/app/entities/entity-routing.module.ts
    //        specifier   = "./page/page.module"
    //    → candidate_base = /proj/src/app/entities/page/page.module
    let parent_dir = parent_file.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{parent_file:?} の親ディレクトリが取得できません"),
        )
    })?;
    let candidate_base = parent_dir.join(specifier);

    // 3) 典型的なファイル名パターンを列挙
    let mut candidates: Vec<PathBuf> = Vec::new();

    // A) page.module.ts を直接探す
    candidates.push(append_extension(&candidate_base, "ts"));

    // B) page-routing.module.ts が隣にあるか探す
    if let Some(stem) = candidate_base.file_stem() {
        let routing_name = format!("{}-routing.module.ts", stem.to_string_lossy());
        candidates.push(candidate_base.with_file_name(routing_name));
    }

    // C) candidate_base がディレクトリなら、その中の <name>-routing.module.ts と index.ts
    if candidate_base.is_dir() {
        if let Some(name) = candidate_base.file_name() {
            candidates.push(candidate_base.join(format!("{}-routing.module.ts", name.to_string_lossy())));
        }
        candidates.push(candidate_base.join("index.ts"));
    }

    // 4) 絶対パス化して、最初に存在するものを返す
    for cand in candidates {
        let abs = cand.absolutize()?.to_path_buf();
        if fs::metadata(&abs).is_ok_and(|m| m.is_file()) {
            return Ok(Some(abs));
        }
    }

    Ok(None)
}

/// `page.module` + "ts" → `page.module.ts` (with_extension だと ".module" が置き換わってしまう)
fn append_extension(base: &Path, ext: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn resolves_module_file_next_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("entities/entity-routing.module.ts");
        touch(&parent);
        touch(&dir.path().join("entities/page/page.module.ts"));

        let found = resolve_load_children_path("./page/page.module", &parent)
            .unwrap()
            .unwrap();
        assert!(found.ends_with("entities/page/page.module.ts"));
        assert!(found.is_absolute());
    }

    #[test]
    fn falls_back_to_sibling_routing_module() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("app/app-routing.module.ts");
        touch(&parent);
        touch(&dir.path().join("app/admin/admin-routing.module.ts"));

        let found = resolve_load_children_path("./admin/admin", &parent)
            .unwrap()
            .unwrap();
        assert!(found.ends_with("app/admin/admin-routing.module.ts"));
    }

    #[test]
    fn resolves_parent_relative_specifier() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("app/layouts/main-routing.module.ts");
        touch(&parent);
        touch(&dir.path().join("app/entities/entity-routing.module.ts"));

        let found = resolve_load_children_path("../entities/entity-routing.module", &parent)
            .unwrap()
            .unwrap();
        assert!(found.ends_with("app/entities/entity-routing.module.ts"));
        assert!(!found.to_string_lossy().contains(".."));
    }

    #[test]
    fn package_specifiers_are_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("app-routing.module.ts");

        assert_eq!(resolve_load_children_path("@acme/admin", &parent).unwrap(), None);
    }

    #[test]
    fn missing_target_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("app-routing.module.ts");
        touch(&parent);

        assert_eq!(resolve_load_children_path("./gone/gone.module", &parent).unwrap(), None);
    }
}
