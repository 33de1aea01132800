use clap::{Arg, Command};
use simctl::logging::{self, LogConfig, LogOutput};
use simctl::orchestration::SessionOrchestrator;
use simctl::plan::SessionPlan;
use std::str::FromStr;

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("simctl")
        .version("0.1.0")
        .about("車両物理シミュレータ リモート制御クライアント")
        .long_about("車両物理シミュレータのリモート制御セッションを実行します。\n\
                     プロセス起動、シナリオロード、設定バッチ適用、後始末までを\n\
                     セッションプラン(.yaml)に従って順序どおりに行います。")
        .arg(
            Arg::new("plan")
                .short('p')
                .long("plan")
                .value_name("FILE")
                .help("セッションプランファイル(.yaml)のパスを指定")
                .long_help("実行するセッションプランファイル(.yaml)のパスを指定します。\n\
                           指定しない場合、利用可能なプランの一覧を表示します。")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("プランの情報のみ表示して終了")
        )
        .arg(
            Arg::new("no-launch")
                .short('n')
                .long("no-launch")
                .action(clap::ArgAction::SetTrue)
                .help("プロセスを起動せず、実行中のシミュレータへ接続")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("DEST")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .get_matches();

    println!("車両物理シミュレータ リモート制御 - simctl v0.1.0");
    println!();

    // ログシステムの初期化
    let log_output = matches
        .get_one::<String>("log-output")
        .map(|s| LogOutput::from_str(s))
        .transpose()
        .unwrap_or_else(|e| {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        })
        .unwrap_or(LogOutput::Console);
    let log_config = LogConfig {
        level: logging::parse_log_level(
            matches
                .get_one::<String>("log-level")
                .map(String::as_str)
                .unwrap_or("info"),
        ),
        output: log_output,
        ..LogConfig::default()
    };
    if log_output != LogOutput::Console {
        if let Err(e) = logging::ensure_log_directory(&log_config.log_dir) {
            eprintln!("エラー: ログディレクトリを作成できません: {}", e);
            std::process::exit(1);
        }
    }
    if let Err(e) = logging::init_logging(log_config) {
        eprintln!("エラー: ログ初期化に失敗しました: {}", e);
        std::process::exit(1);
    }

    // 詳細レベルの設定
    let verbose_level = matches.get_count("verbose");
    if verbose_level > 0 {
        println!("詳細出力レベル: {}", verbose_level);
    }

    // プランファイルの処理
    if let Some(plan_path) = matches.get_one::<String>("plan") {
        match run_plan(
            plan_path,
            matches.get_flag("info"),
            matches.get_flag("no-launch"),
            verbose_level,
        ) {
            Ok(_) => {
                if verbose_level > 0 {
                    println!("セッションが正常に完了しました。");
                }
            }
            Err(e) => {
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        // デフォルト動作: 利用可能なプラン一覧を表示
        show_default_help();
    }
}

/// プランファイルを読み込んで実行
fn run_plan(
    plan_path: &str,
    info_only: bool,
    no_launch: bool,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    // プランファイルの読み込み
    let mut plan = SessionPlan::from_file(plan_path)?;

    if verbose_level > 0 {
        println!("プランファイル読み込み完了: {}", plan_path);
    }

    // 情報表示のみの場合
    if info_only {
        plan.print_summary();
        return Ok(());
    }

    // --no-launch はプランの起動設定を上書きする
    if no_launch {
        plan.launch.enabled = false;
    }

    // 基本情報表示
    plan.print_summary();
    println!();

    // セッション実行
    let mut orchestrator = SessionOrchestrator::new(plan, verbose_level);
    orchestrator.run()?;

    Ok(())
}

/// デフォルトヘルプとプラン一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  simctl [オプション]");
    println!();
    println!("オプション:");
    println!("  -p, --plan <FILE>      セッションプランファイルを指定して実行");
    println!("  -i, --info             プラン情報のみ表示");
    println!("  -n, --no-launch        プロセスを起動せず既存プロセスへ接続");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LVL>  ログレベル (trace, debug, info, warn, error)");
    println!("      --log-output <DST> ログ出力先 (console, file, both)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なプランファイル:");
    println!("  plans/plan_graphics_demo.yaml - グラフィック設定変更のデモ");
    println!();
    println!("例:");
    println!("  simctl -p plans/plan_graphics_demo.yaml");
    println!("  simctl -p plans/plan_graphics_demo.yaml -v");
    println!("  simctl -p plans/plan_graphics_demo.yaml -i");
    println!("  simctl -p plans/plan_graphics_demo.yaml -n");
}
