use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Table};
use radar::analyzer::{self, TestAnalysis};
use radar::config::{ConfigLoader, RadarConfig};
use radar::history::{self, HistoryStorage};
use radar::report::{Report, ReportWriter};
use radar::runner::{BatchCancel, TestExecutor, TestReporter};
use radar::scanner::{Scanner, TestCase};
use tracing::warn;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

/// 用户中断时的退出码
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 配置文件路径（默认查找 radar.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 列出发现的测试用例
    Scan(ScanArgs),

    /// 执行测试并汇总结果
    Run(RunArgs),

    /// 不执行测试，只分析源码
    Analyze(AnalyzeArgs),

    /// 查看运行历史
    History {
        /// 显示最近 N 条
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args)]
pub struct ScanArgs {
    /// 测试文件或目录
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// 文件名匹配模式（覆盖配置）
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// 以 JSON 输出
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct RunArgs {
    /// 测试文件或目录
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// 并发数，0 表示按 CPU 数决定
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// 单个用例超时时间（秒）
    #[arg(long)]
    pub timeout: Option<f64>,

    /// 不收集覆盖率
    #[arg(long)]
    pub no_coverage: bool,

    /// 保存报告（.json 为 JSON，其余为纯文本）
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// 执行后分析结果
    #[arg(long)]
    pub analyze: bool,

    /// 显示失败用例的完整输出
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    /// 测试文件或目录
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// 列出建议修改涉及的文件（不会改动文件）
    #[arg(long)]
    pub fix: bool,
}

pub async fn dispatch(cli: Cli, config: RadarConfig) -> Result<ExitCode> {
    match cli.command {
        Commands::Scan(args) => scan(config, args),
        Commands::Run(args) => run(config, args).await,
        Commands::Analyze(args) => analyze(config, args).await,
        Commands::History { limit } => {
            let storage = HistoryStorage::in_dir(&config.history_dir);
            history::list_history(&storage, limit)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn scan(mut config: RadarConfig, args: ScanArgs) -> Result<ExitCode> {
    if let Some(pattern) = args.pattern {
        config.scanner.file_pattern = pattern;
    }
    let scanner = Scanner::new(&config.scanner)?;
    let cases = collect_cases(&scanner, &args.paths)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(ExitCode::SUCCESS);
    }

    if cases.is_empty() {
        println!("No tests found");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["ID", "Line", "Tags", "Description"]);
    for case in &cases {
        let tags = case.tags.iter().cloned().collect::<Vec<_>>().join(", ");
        let description = case
            .description
            .as_deref()
            .and_then(|d| d.lines().next())
            .unwrap_or("");
        table.add_row(vec![
            Cell::new(&case.id),
            Cell::new(case.location.line),
            Cell::new(tags),
            Cell::new(description).add_attribute(Attribute::Dim),
        ]);
    }
    println!("{}", table);
    println!("\n{} tests found", cases.len().to_string().bold());
    Ok(ExitCode::SUCCESS)
}

async fn run(mut config: RadarConfig, args: RunArgs) -> Result<ExitCode> {
    if let Some(jobs) = args.jobs {
        config.test.concurrency = jobs;
    }
    if let Some(timeout) = args.timeout {
        config.test.timeout = timeout;
    }
    if args.no_coverage {
        config.test.coverage = false;
    }
    ConfigLoader::validate(&config)?;

    let scanner = Scanner::new(&config.scanner)?;
    let cases = collect_cases(&scanner, &args.paths)?;
    if cases.is_empty() {
        println!("No tests found");
        return Ok(ExitCode::FAILURE);
    }

    let executor = TestExecutor::new(config.test.clone())?;
    let reporter = TestReporter::new(args.verbose);
    reporter.print_header(
        cases.len(),
        config.test.effective_concurrency().min(cases.len()),
    );

    // Ctrl-C 取消整批执行
    let cancel = BatchCancel::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping running tests");
                cancel.cancel();
            }
        })
    };
    let outcome = executor.run_cancellable(&cases, &cancel).await;
    watcher.abort();

    let (results, cancelled) = match outcome {
        Ok(results) => (results, false),
        Err(e) => (e.partial, true),
    };

    for result in results.values() {
        reporter.print_result(result);
    }
    let mut report = Report::aggregate(&cases, &results);
    reporter.print_summary(&report);

    let paths: Vec<String> = args
        .paths
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    history::record_run(
        &HistoryStorage::in_dir(&config.history_dir),
        &paths,
        &report,
    );

    if args.analyze || config.analyzer.enabled {
        let analyzer = analyzer::build_analyzer(&config.analyzer);
        let analyses = analyzer::analyze_all(analyzer.as_ref(), &scanner, &cases, &results).await;
        print_analyses(&analyses);
        report = report.with_analyses(analyses);
    }

    if let Some(path) = &args.report {
        let path = report_path(&config, path);
        ReportWriter::save(&report, &path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    Ok(if cancelled {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn analyze(config: RadarConfig, args: AnalyzeArgs) -> Result<ExitCode> {
    let scanner = Scanner::new(&config.scanner)?;
    let cases = collect_cases(&scanner, &args.paths)?;
    if cases.is_empty() {
        println!("No tests found");
        return Ok(ExitCode::FAILURE);
    }

    println!("\nAnalyzing {} tests...", cases.len());
    let analyzer = analyzer::build_analyzer(&config.analyzer);
    let analyses = analyzer::analyze_sources(analyzer.as_ref(), &scanner, &cases).await;
    print_analyses(&analyses);

    if args.fix {
        let targets = analyzer::fix_targets(&analyses);
        if targets.is_empty() {
            println!("No fixes suggested");
        }
        for (file, fixes) in targets {
            println!(
                "{} {} fix(es) to {}",
                "Would apply".yellow(),
                fixes.len(),
                file.display()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// 扫描所有路径；单个文件的错误（包括跨路径的 ID 冲突）只记录警告
fn collect_cases(scanner: &Scanner, paths: &[PathBuf]) -> Result<Vec<TestCase>> {
    let collected = scanner.scan_all(paths)?;
    for error in &collected.errors {
        eprintln!("{}: {}", "Warning".yellow(), error);
    }
    if !collected.errors.is_empty() {
        eprintln!(
            "{}: {} file(s) could not be scanned",
            "Warning".yellow(),
            collected.errors.len()
        );
    }
    Ok(collected.cases)
}

/// 相对路径放在 report_dir 下
fn report_path(config: &RadarConfig, path: &Path) -> PathBuf {
    if path.is_absolute() || path.parent().is_some_and(|p| !p.as_os_str().is_empty()) {
        path.to_path_buf()
    } else {
        Path::new(&config.report_dir).join(path)
    }
}

fn print_analyses(analyses: &[TestAnalysis]) {
    let findings: Vec<_> = analyses.iter().filter(|a| !a.is_clean()).collect();
    if findings.is_empty() {
        println!("{}", "Analysis found no issues".green());
        return;
    }

    println!("\n{}", "Analysis".bold());
    for analysis in findings {
        println!("\n{}", analysis.test_id.cyan().bold());
        if !analysis.issues.is_empty() {
            println!("  {}", "Issues:".red());
            for issue in &analysis.issues {
                println!("    - {}", issue);
            }
        }
        if !analysis.suggestions.is_empty() {
            println!("  {}", "Suggestions:".green());
            for suggestion in &analysis.suggestions {
                println!("    - {}", suggestion);
            }
        }
        for fix in &analysis.fixes {
            println!(
                "  {} {}:{}",
                "Fix:".yellow(),
                fix.file_path.display(),
                fix.line_start
            );
            for line in fix.suggested_code.lines() {
                println!("    {}", line);
            }
        }
        if !analysis.coverage_gaps.is_empty() {
            println!("  {}", "Coverage Gaps:".yellow());
            for gap in &analysis.coverage_gaps {
                println!("    - {}", gap);
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "radar", "run", "tests", "-j", "4", "--timeout", "30", "--no-coverage", "--report",
            "out.json", "-v",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.paths, vec![PathBuf::from("tests")]);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.timeout, Some(30.0));
        assert!(args.no_coverage);
        assert!(args.verbose);
        assert!(!args.analyze);
        assert_eq!(args.report, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_parse_global_config_and_history() {
        let cli = Cli::try_parse_from(["radar", "history", "-n", "5", "--config", "ci.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ci.toml")));
        assert!(matches!(cli.command, Commands::History { limit: 5 }));
    }

    #[test]
    fn test_parse_analyze_args() {
        let cli = Cli::try_parse_from(["radar", "analyze", "tests", "api", "--fix"]).unwrap();
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze command");
        };
        assert_eq!(args.paths, vec![PathBuf::from("tests"), PathBuf::from("api")]);
        assert!(args.fix);

        let cli = Cli::try_parse_from(["radar", "analyze", "tests"]).unwrap();
        assert!(matches!(cli.command, Commands::Analyze(AnalyzeArgs { fix: false, .. })));
    }

    #[test]
    fn test_paths_are_required() {
        assert!(Cli::try_parse_from(["radar", "run"]).is_err());
        assert!(Cli::try_parse_from(["radar", "scan"]).is_err());
        assert!(Cli::try_parse_from(["radar", "analyze"]).is_err());
    }

    #[test]
    fn test_report_path() {
        let config = RadarConfig::default();
        assert_eq!(
            report_path(&config, Path::new("run.json")),
            PathBuf::from("reports/run.json")
        );
        assert_eq!(
            report_path(&config, Path::new("out/run.json")),
            PathBuf::from("out/run.json")
        );
    }
}
