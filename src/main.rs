// src/main.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lazy_route_registry::analyze::{analyze_project, check_declarations};
use lazy_route_registry::generator::{DEFAULT_NEEDLE, NewRoute, Outcome, append_route_to_file};
use lazy_route_registry::parser::parse_routes_in_file;
use lazy_route_registry::LoadChildren;

/// CLI 引数定義
#[derive(Parser, Debug)]
#[command(
    name = "lazy-route-registry",
    version = "0.1.0",
    about = "Angular の遅延ロードルートを解析・検証し、needle へルートを追記する CLI ツール"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// プロジェクトのルーティング設計を再帰的に解析して JSON 出力する
    Analyze {
        /// 解析対象の Angular プロジェクトルート
        /// 例: `--project-root C:/path/to/my-angular-project`
        #[arg(short = 'r', long = "project-root", value_name = "DIR")]
        project_root: PathBuf,
    },

    /// ルーティングファイルのレジストリを検証する (モジュールはロードしない)
    Check {
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /// このファイルがマウントされる名前空間
        #[arg(short = 'n', long = "namespace", default_value = "")]
        namespace: String,
    },

    /// needle の直前に遅延ルートを追記する (同じ入力なら何もしない)
    AddRoute {
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /// パスセグメント (例: page)
        #[arg(short = 'p', long = "path")]
        path: String,

        /// import 先 (例: ./page/page.module)
        #[arg(short = 'm', long = "module")]
        module: String,

        /// `.then(m => m.X)` で取り出すシンボル (例: PageModule)
        #[arg(short = 'e', long = "export")]
        export: Option<String>,

        /// data.pageTitle
        #[arg(short = 't', long = "title")]
        title: Option<String>,

        #[arg(long = "needle", default_value = DEFAULT_NEEDLE)]
        needle: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 標準出力は JSON 用に空けておき、ログは標準エラーへ
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lazy_route_registry=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze { project_root } => {
            let routes = analyze_project(&project_root).await?;
            println!("{}", serde_json::to_string_pretty(&routes)?);
        }
        Command::Check { file, namespace } => {
            let declarations = parse_routes_in_file(&file)?;
            let registries = check_declarations(&namespace, &declarations)?;
            for registry in registries.iter().filter(|r| !r.is_empty()) {
                for entry in registry {
                    println!(
                        "{}\t{}\t{}",
                        entry.key(),
                        entry.loader().describe(),
                        entry.page_title().unwrap_or("-")
                    );
                }
            }
            let total: usize = registries.iter().map(|r| r.len()).sum();
            tracing::info!(file = ?file, lazy_routes = total, "検証 OK");
        }
        Command::AddRoute {
            file,
            path,
            module,
            export,
            title,
            needle,
        } => {
            let route = NewRoute {
                segment: path,
                page_title: title,
                target: LoadChildren::new(module, export),
            };
            match append_route_to_file(&file, &route, &needle)? {
                Outcome::Inserted => println!("inserted: {}", route.segment),
                Outcome::AlreadyPresent => println!("already present: {}", route.segment),
            }
        }
    }

    Ok(())
}
