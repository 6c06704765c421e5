// src/generator.rs
//! needle (挿入位置を示すコメント) の直前に遅延ルートを追記する。
//!
//! 既存のエントリは一切書き換えず、needle 行も動かさない。
//! 同じ入力で二度実行しても結果のファイルは変わらない。

use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, GenerateError};
use crate::model::LoadChildren;
use crate::parser::parse_routes_in_source;
use crate::registry::validate_segment;

/// JHipster が entity-routing.module.ts に置く needle
pub const DEFAULT_NEEDLE: &str = "jhipster-needle-add-entity-route";

const INDENT_UNIT: &str = "  ";

/// 追記するルート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoute {
    pub segment: String,
    pub page_title: Option<String>,
    pub target: LoadChildren,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    pub source: String,
    pub outcome: Outcome,
}

/// `source` の needle 行の直前に `route` を挿入した結果を返す。
/// 同じセグメント・同じ import 先のエントリが既にあれば `source` をそのまま返す。
pub fn append_route(
    file: &Path,
    source: &str,
    route: &NewRoute,
    needle: &str,
) -> Result<Appended, GenerateError> {
    let namespace = file.display().to_string();
    validate_segment(&namespace, &route.segment)?;

    let needle_lines: Vec<(usize, &str)> = line_offsets(source)
        .filter(|(_, line)| line.contains(needle))
        .collect();
    let (offset, needle_line) = match needle_lines.as_slice() {
        [single] => *single,
        [] => {
            return Err(GenerateError::MissingNeedle {
                file: file.to_path_buf(),
                needle: needle.to_string(),
            });
        }
        many => {
            return Err(GenerateError::AmbiguousNeedle {
                file: file.to_path_buf(),
                needle: needle.to_string(),
                count: many.len(),
            });
        }
    };

    let existing = parse_routes_in_source(file, source.to_string())?;
    if let Some(current) = existing
        .iter()
        .find(|r| r.path.as_deref() == Some(route.segment.as_str()))
    {
        if current.load_children.as_ref() == Some(&route.target) {
            debug!(segment = %route.segment, "同じルートが既に登録済み");
            return Ok(Appended {
                source: source.to_string(),
                outcome: Outcome::AlreadyPresent,
            });
        }
        return Err(ConfigError::DuplicateSegment {
            namespace,
            segment: route.segment.clone(),
        }
        .into());
    }

    let indent: String = needle_line
        .chars()
        .take_while(|c| c.is_whitespace() && *c != '\n' && *c != '\r')
        .collect();
    let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };

    let mut updated = String::with_capacity(source.len() + 256);
    match missing_separator(&source[..offset]) {
        Some(at) => {
            debug!(segment = %route.segment, "直前の要素にカンマを補う");
            updated.push_str(&source[..at]);
            updated.push(',');
            updated.push_str(&source[at..offset]);
        }
        None => updated.push_str(&source[..offset]),
    }
    updated.push_str(&render_entry(route, &indent, newline));
    updated.push_str(&source[offset..]);

    // 書き戻す前に、追記後もルート配列として読めることを確かめる
    let reparsed = parse_routes_in_source(file, updated.clone())?;
    let placed = reparsed.iter().any(|r| {
        r.path.as_deref() == Some(route.segment.as_str())
            && r.load_children.as_ref() == Some(&route.target)
    });
    if !placed {
        return Err(GenerateError::Misplaced {
            file: file.to_path_buf(),
            needle: needle.to_string(),
        });
    }

    info!(segment = %route.segment, file = ?file, "ルートを追記");
    Ok(Appended {
        source: updated,
        outcome: Outcome::Inserted,
    })
}

/// ファイルを読み込んで追記し、挿入した場合だけ書き戻す
pub fn append_route_to_file(
    path: &Path,
    route: &NewRoute,
    needle: &str,
) -> Result<Outcome, GenerateError> {
    let io_error = |source| GenerateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let source = fs::read_to_string(path).map_err(io_error)?;
    let appended = append_route(path, &source, route, needle)?;
    if appended.outcome == Outcome::Inserted {
        fs::write(path, appended.source).map_err(io_error)?;
    }
    Ok(appended.outcome)
}

/// 直前の配列要素がカンマで終わっていなければ、カンマを入れる位置を返す
fn missing_separator(before_needle: &str) -> Option<usize> {
    let (at, last) = before_needle
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_whitespace())?;
    match last {
        '}' | ')' | ']' | '\'' | '"' | '`' => Some(at + last.len_utf8()),
        c if c.is_alphanumeric() || c == '_' || c == '$' => Some(at + c.len_utf8()),
        _ => None,
    }
}

/// 各行の開始オフセットと行の内容
fn line_offsets(source: &str) -> impl Iterator<Item = (usize, &str)> {
    source.split_inclusive('\n').scan(0, |offset, line| {
        let start = *offset;
        *offset += line.len();
        Some((start, line))
    })
}

fn render_entry(route: &NewRoute, indent: &str, newline: &str) -> String {
    let inner = format!("{indent}{INDENT_UNIT}");
    let mut out = format!("{indent}{{{newline}");
    out.push_str(&format!("{inner}path: '{}',{newline}", quote(&route.segment)));
    if let Some(title) = &route.page_title {
        out.push_str(&format!("{inner}data: {{ pageTitle: '{}' }},{newline}", quote(title)));
    }
    let import = format!("import('{}')", quote(&route.target.specifier));
    match &route.target.export {
        Some(export) => out.push_str(&format!(
            "{inner}loadChildren: () => {import}.then(m => m.{export}),{newline}"
        )),
        None => out.push_str(&format!("{inner}loadChildren: () => {import},{newline}")),
    }
    out.push_str(&format!("{indent}}},{newline}"));
    out
}

/// シングルクォート文字列用のエスケープ
fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
