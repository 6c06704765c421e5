use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser as SwcParser, StringInput, Syntax, TsConfig};
use swc_ecma_visit::{Visit, VisitWith};

use serde_json::{Map, Number, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::ParseError;
use crate::model::{LoadChildren, RouteData, RouteNode};

/// `RouterModule.forRoot/forChild` に渡された引数
enum RouterArg {
    Inline(Vec<RouteNode>),
    Variable(String),
}

/// AST をトラバースしてルート定義を抽出するための Visitor
struct RouteVisitor {
    /// この Visitor が解析対象としているファイル
    source_file: PathBuf,
    /// RouterModule 呼び出しの引数 (出現順)
    router_args: Vec<RouterArg>,
    /// 変数名とその配列リテラルから作ったルート (宣言順)
    route_variables: Vec<(String, Vec<RouteNode>)>,
}

impl RouteVisitor {
    fn new(source_file: PathBuf) -> Self {
        RouteVisitor {
            source_file,
            router_args: Vec::new(),
            route_variables: Vec::new(),
        }
    }

    /// ObjectLit (例: `{ path: "page", data: {...}, loadChildren: () => import("…") }`) から
    /// RouteNode を構築する
    fn parse_route_object(&self, obj_lit: &ObjectLit) -> RouteNode {
        let mut path: Option<String> = None;
        let mut data = RouteData::new();
        let mut load_children: Option<LoadChildren> = None;
        let mut children: Vec<RouteNode> = Vec::new();

        for prop in &obj_lit.props {
            let PropOrSpread::Prop(boxed_prop) = prop else {
                continue;
            };
            let Prop::KeyValue(KeyValueProp { key, value }) = &**boxed_prop else {
                continue;
            };
            let Some(key_name) = prop_name(key) else {
                continue;
            };
            trace!(key = %key_name, "プロパティ発見");

            match key_name.as_str() {
                "path" => path = string_value(value),
                "data" => match unwrap_expr(value) {
                    Expr::Object(data_obj) => data = object_to_json(data_obj),
                    other => debug!(?other, "data がオブジェクトリテラルではありません"),
                },
                "loadChildren" => {
                    load_children = parse_load_children(value);
                    if load_children.is_none() {
                        debug!("loadChildren の import 先を特定できません");
                    }
                }
                "children" => {
                    if let Expr::Array(arr_lit) = unwrap_expr(value) {
                        children = self.extract_routes_from_array(arr_lit);
                    }
                }
                _ => {}
            }
        }

        RouteNode {
            path,
            data,
            load_children,
            source_file: self.source_file.clone(),
            children,
            load_error: None,
        }
    }

    /// 配列からルート情報を抽出する
    fn extract_routes_from_array(&self, arr_lit: &ArrayLit) -> Vec<RouteNode> {
        let mut routes = Vec::new();
        for elem in arr_lit.elems.iter().flatten() {
            if elem.spread.is_some() {
                debug!("スプレッド要素は追跡しません");
                continue;
            }
            if let Expr::Object(obj_lit) = unwrap_expr(&elem.expr) {
                let route = self.parse_route_object(obj_lit);
                debug!(path = ?route.path, load_children = ?route.load_children, "ルート情報生成");
                routes.push(route);
            }
        }
        routes
    }

    /// 変数として宣言された配列が、ルート定義らしいかどうか
    fn looks_like_route_variable(name: &str, type_ann: Option<&TsTypeAnn>) -> bool {
        if name.to_ascii_lowercase().contains("route") {
            return true;
        }
        matches!(
            type_ann.map(|t| &*t.type_ann),
            Some(TsType::TsTypeRef(TsTypeRef { type_name: TsEntityName::Ident(ident), .. }))
                if &*ident.sym == "Routes"
        )
    }

    fn variable_routes(&self, name: &str) -> Option<&Vec<RouteNode>> {
        self.route_variables
            .iter()
            .find(|(var, _)| var == name)
            .map(|(_, routes)| routes)
    }

    /// RouterModule 呼び出しを優先し、無ければルート変数そのものを返す
    fn into_routes(self) -> Vec<RouteNode> {
        if self.router_args.is_empty() {
            return self
                .route_variables
                .into_iter()
                .flat_map(|(_, routes)| routes)
                .collect();
        }

        let mut routes = Vec::new();
        for arg in &self.router_args {
            match arg {
                RouterArg::Inline(inline) => routes.extend(inline.iter().cloned()),
                RouterArg::Variable(name) => match self.variable_routes(name) {
                    Some(found) => routes.extend(found.iter().cloned()),
                    None => debug!(variable = %name, "変数の定義が見つかりません"),
                },
            }
        }
        routes
    }
}

impl Visit for RouteVisitor {
    /// 変数宣言をキャッチして、ルート定義らしい配列を記録する
    fn visit_var_decl(&mut self, var_decl: &VarDecl) {
        for declarator in &var_decl.decls {
            let Pat::Ident(BindingIdent { id, type_ann }) = &declarator.name else {
                continue;
            };
            let var_name = id.sym.to_string();
            if !Self::looks_like_route_variable(&var_name, type_ann.as_deref()) {
                continue;
            }
            if let Some(Expr::Array(arr_lit)) = declarator.init.as_deref().map(unwrap_expr) {
                let routes = self.extract_routes_from_array(arr_lit);
                debug!(variable = %var_name, count = routes.len(), "ルート変数を記録");
                self.route_variables.push((var_name, routes));
            }
        }

        var_decl.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if is_router_module_call(call) {
            match call.args.first().map(|a| unwrap_expr(&a.expr)) {
                // 直接配列リテラルの場合
                Some(Expr::Array(arr_lit)) => {
                    let routes = self.extract_routes_from_array(arr_lit);
                    self.router_args.push(RouterArg::Inline(routes));
                }
                // 変数参照の場合 (宣言が後ろにあってもよいよう、解決は最後に行う)
                Some(Expr::Ident(ident)) => {
                    self.router_args.push(RouterArg::Variable(ident.sym.to_string()));
                }
                other => debug!(?other, "第一引数が配列でも変数でもありません"),
            }
        }
        call.visit_children_with(self);
    }
}

/// `RouterModule.forRoot(...)` / `RouterModule.forChild(...)` かどうか
fn is_router_module_call(call: &CallExpr) -> bool {
    let Callee::Expr(expr) = &call.callee else {
        return false;
    };
    let Expr::Member(MemberExpr { obj, prop, .. }) = &**expr else {
        return false;
    };
    let (Expr::Ident(obj_ident), MemberProp::Ident(prop_ident)) = (&**obj, prop) else {
        return false;
    };
    &*obj_ident.sym == "RouterModule"
        && matches!(&*prop_ident.sym, "forRoot" | "forChild")
}

/// 括弧や `as` を剥がす
fn unwrap_expr(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(ParenExpr { expr, .. }) => unwrap_expr(expr),
        Expr::TsAs(TsAsExpr { expr, .. }) => unwrap_expr(expr),
        other => other,
    }
}

fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(Str { value, .. }) => Some(value.to_string()),
        _ => None,
    }
}

fn string_value(expr: &Expr) -> Option<String> {
    match unwrap_expr(expr) {
        Expr::Lit(Lit::Str(Str { value, .. })) => Some(value.to_string()),
        // 埋め込み式のないテンプレートリテラルだけ
        Expr::Tpl(Tpl { exprs, quasis, .. }) if exprs.is_empty() => quasis
            .first()
            .and_then(|q| q.cooked.as_ref())
            .map(|c| c.to_string()),
        _ => None,
    }
}

/// `() => import("./page/page.module").then(m => m.PageModule)` を分解する
fn parse_load_children(expr: &Expr) -> Option<LoadChildren> {
    let Expr::Arrow(ArrowExpr { body, .. }) = unwrap_expr(expr) else {
        return None;
    };
    let returned = match &**body {
        BlockStmtOrExpr::Expr(expr) => &**expr,
        // { return import(...) } 形式
        BlockStmtOrExpr::BlockStmt(block) => block.stmts.iter().find_map(|stmt| match stmt {
            Stmt::Return(ReturnStmt { arg: Some(arg), .. }) => Some(&**arg),
            _ => None,
        })?,
    };
    parse_import_chain(unwrap_expr(returned))
}

fn parse_import_chain(expr: &Expr) -> Option<LoadChildren> {
    let Expr::Call(call) = expr else {
        return None;
    };
    match &call.callee {
        Callee::Import(_) => {
            let specifier = call.args.first().and_then(|a| string_value(&a.expr))?;
            Some(LoadChildren::new(specifier, None))
        }
        Callee::Expr(callee) => {
            let Expr::Member(MemberExpr {
                obj,
                prop: MemberProp::Ident(method),
                ..
            }) = &**callee
            else {
                return None;
            };
            if &*method.sym != "then" {
                return None;
            }
            let mut target = parse_import_chain(unwrap_expr(obj))?;
            target.export = call.args.first().and_then(|a| exported_symbol(&a.expr));
            Some(target)
        }
        _ => None,
    }
}

/// `m => m.PageModule` の `PageModule`
fn exported_symbol(expr: &Expr) -> Option<String> {
    let Expr::Arrow(ArrowExpr { body, .. }) = unwrap_expr(expr) else {
        return None;
    };
    let BlockStmtOrExpr::Expr(body) = &**body else {
        return None;
    };
    match unwrap_expr(body) {
        Expr::Member(MemberExpr {
            prop: MemberProp::Ident(ident),
            ..
        }) => Some(ident.sym.to_string()),
        _ => None,
    }
}

fn object_to_json(obj_lit: &ObjectLit) -> Map<String, Value> {
    let mut map = Map::new();
    for prop in &obj_lit.props {
        let PropOrSpread::Prop(boxed_prop) = prop else {
            continue;
        };
        let Prop::KeyValue(KeyValueProp { key, value }) = &**boxed_prop else {
            continue;
        };
        if let Some(key) = prop_name(key) {
            let value = expr_to_json(value).unwrap_or_else(|| {
                debug!(key = %key, "リテラル以外の data 値は null として扱います");
                Value::Null
            });
            map.insert(key, value);
        }
    }
    map
}

/// 整数として書かれた値は整数のまま保持する
fn number_value(value: f64) -> Option<Number> {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(Number::from(value as i64))
    } else {
        Number::from_f64(value)
    }
}

fn expr_to_json(expr: &Expr) -> Option<Value> {
    match unwrap_expr(expr) {
        Expr::Lit(Lit::Num(num)) => number_value(num.value).map(Value::Number),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),
        Expr::Object(obj) => Some(Value::Object(object_to_json(obj))),
        Expr::Array(arr) => arr
            .elems
            .iter()
            .map(|e| e.as_ref().and_then(|e| expr_to_json(&e.expr)))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        other => string_value(other).map(Value::String),
    }
}

pub fn parse_routes_in_file(file_path: &Path) -> Result<Vec<RouteNode>, ParseError> {
    let src = fs::read_to_string(file_path).map_err(|source| ParseError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    parse_routes_in_source(file_path, src)
}

/// 既に読み込んだソース文字列を解析する。`file_path` は RouteNode に記録されるパス
pub fn parse_routes_in_source(file_path: &Path, src: String) -> Result<Vec<RouteNode>, ParseError> {
    debug!(file = ?file_path, bytes = src.len(), "ファイル解析開始");

    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Real(file_path.to_path_buf()), src);

    // TypeScript構文でパースする設定
    let syntax = Syntax::Typescript(TsConfig {
        tsx: false,
        decorators: true,
        dts: false,
        no_early_errors: true,
        disallow_ambiguous_jsx_like: true,
    });

    let lexer = Lexer::new(
        syntax,
        Default::default(), // es version
        StringInput::from(&*fm),
        None,
    );

    let mut parser = SwcParser::new_from(lexer);
    let module = parser.parse_module().map_err(|e| ParseError::Syntax {
        path: file_path.to_path_buf(),
        message: format!("{:?}", e.kind()),
    })?;

    let mut visitor = RouteVisitor::new(file_path.to_path_buf());
    visitor.visit_module(&module);

    let routes = visitor.into_routes();
    debug!(file = ?file_path, routes = routes.len(), "解析完了");
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(src: &str) -> Vec<RouteNode> {
        parse_routes_in_source(Path::new("/proj/entity-routing.module.ts"), src.to_string())
            .unwrap()
    }

    const ENTITY_ROUTING: &str = r#"
import { NgModule } from '@angular/core';
import { RouterModule } from '@angular/router';

@NgModule({
  imports: [
    RouterModule.forChild([
      {
        path: 'page',
        data: { pageTitle: 'Pages' },
        loadChildren: () => import('./page/page.module').then(m => m.PageModule),
      },
      /* jhipster-needle-add-entity-route - JHipster will add entity modules routes here */
    ]),
  ],
})
export class EntityRoutingModule {}
"#;

    #[test]
    fn parses_generated_entity_routing_module() {
        let routes = parse(ENTITY_ROUTING);

        assert_eq!(routes.len(), 1);
        let page = &routes[0];
        assert_eq!(page.path.as_deref(), Some("page"));
        assert_eq!(page.page_title(), Some("Pages"));
        assert_eq!(
            page.load_children,
            Some(LoadChildren::new("./page/page.module", Some("PageModule".into())))
        );
        assert_eq!(page.source_file, PathBuf::from("/proj/entity-routing.module.ts"));
    }

    #[test]
    fn resolves_variable_declared_after_the_call() {
        let routes = parse(
            r#"
@NgModule({ imports: [RouterModule.forRoot(appRoutes)] })
export class AppRoutingModule {}

const appRoutes: Routes = [
  { path: 'admin', loadChildren: () => import('./admin/admin-routing.module') },
];
"#,
        );

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path.as_deref(), Some("admin"));
        assert_eq!(
            routes[0].load_children,
            Some(LoadChildren::new("./admin/admin-routing.module", None))
        );
    }

    #[test]
    fn falls_back_to_exported_routes_variable() {
        let routes = parse(
            r#"
export const ROUTES: Routes = [
  { path: '', data: { pageTitle: 'Home', authorities: ['ROLE_USER'], order: 1 } },
];
"#,
        );

        assert_eq!(routes.len(), 1);
        assert_eq!(
            serde_json::Value::Object(routes[0].data.clone()),
            json!({ "pageTitle": "Home", "authorities": ["ROLE_USER"], "order": 1 })
        );
    }

    #[test]
    fn nested_children_and_block_body_loaders() {
        let routes = parse(
            r#"
RouterModule.forChild([
  {
    path: 'entities',
    children: [
      {
        path: 'head',
        loadChildren: () => {
          return import('./head/head.module').then((m) => m.HeadModule);
        },
      },
    ],
  },
]);
"#,
        );

        assert_eq!(routes.len(), 1);
        assert!(routes[0].load_children.is_none());
        let head = &routes[0].children[0];
        assert_eq!(head.path.as_deref(), Some("head"));
        assert_eq!(
            head.load_children,
            Some(LoadChildren::new("./head/head.module", Some("HeadModule".into())))
        );
    }

    #[test]
    fn non_literal_data_values_become_null() {
        let routes = parse(
            r#"
RouterModule.forChild([{ path: 'page', data: { pageTitle: translate('x'), 'defaultSort': 'id,asc' } }]);
"#,
        );

        assert_eq!(routes[0].data["pageTitle"], Value::Null);
        assert_eq!(routes[0].data["defaultSort"], json!("id,asc"));
    }

    #[test]
    fn integral_numbers_stay_integers() {
        let routes = parse(
            "RouterModule.forChild([{ path: 'page', data: { order: 3, weight: 0.5, big: 1e3 } }]);",
        );

        assert!(routes[0].data["order"].is_i64());
        assert_eq!(routes[0].data["order"], json!(3));
        assert_eq!(routes[0].data["weight"], json!(0.5));
        assert_eq!(routes[0].data["big"], json!(1000));
    }

    #[test]
    fn syntax_errors_are_reported_with_path() {
        let err = parse_routes_in_source(Path::new("/proj/broken.ts"), "const = [".into())
            .unwrap_err();
        match err {
            ParseError::Syntax { path, .. } => assert_eq!(path, PathBuf::from("/proj/broken.ts")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
