// Crawl CLI: run a single crawl or a sequence file against a start URL.
//
// Exit codes: 0 success, 1 generic failure, 2 invalid arguments,
// 3 database allocation failure.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use newscrawl::crawl_engine::CrawlLoopError;
use newscrawl::sequence::{SequenceConfigLoader, StaticTokenResolver};
use newscrawl::{CrawlConfig, CrawlLoop, EventBus, OperationsFacade, SequenceRunner};

const USAGE: &str = "\
usage: newscrawl <start-url> [options]
       newscrawl --sequence <file> --start-url <url> [options]

options:
  --max-pages <n>      page budget for the job
  --max-depth <n>      link depth limit (default 3)
  --workers <n>        concurrent workers (default 4)
  --rpm <f>            requests per minute per host (default 60)
  --db <path>          content database path (default ./data/news.db)
  --data-dir <path>    working directory for crawl data (default ./data)
  --no-robots          do not fetch or honor robots.txt
  --sequence <file>    run a JSON/YAML sequence file instead of one crawl
  --start-url <url>    start URL (positional form also accepted)
";

struct CliOptions {
    start_url: Option<String>,
    sequence: Option<PathBuf>,
    max_pages: Option<u64>,
    max_depth: Option<u16>,
    workers: Option<usize>,
    rpm: Option<f64>,
    db: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    respect_robots: bool,
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        start_url: None,
        sequence: None,
        max_pages: None,
        max_depth: None,
        workers: None,
        rpm: None,
        db: None,
        data_dir: None,
        respect_robots: true,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| -> Result<String, String> {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--max-pages" => {
                let v = value_for("--max-pages")?;
                options.max_pages =
                    Some(v.parse().map_err(|_| format!("bad --max-pages: {v}"))?);
            }
            "--max-depth" => {
                let v = value_for("--max-depth")?;
                options.max_depth =
                    Some(v.parse().map_err(|_| format!("bad --max-depth: {v}"))?);
            }
            "--workers" => {
                let v = value_for("--workers")?;
                options.workers = Some(v.parse().map_err(|_| format!("bad --workers: {v}"))?);
            }
            "--rpm" => {
                let v = value_for("--rpm")?;
                options.rpm = Some(v.parse().map_err(|_| format!("bad --rpm: {v}"))?);
            }
            "--db" => options.db = Some(PathBuf::from(value_for("--db")?)),
            "--data-dir" => options.data_dir = Some(PathBuf::from(value_for("--data-dir")?)),
            "--no-robots" => options.respect_robots = false,
            "--sequence" => options.sequence = Some(PathBuf::from(value_for("--sequence")?)),
            "--start-url" => options.start_url = Some(value_for("--start-url")?),
            "--help" | "-h" => return Err(String::new()),
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}"));
            }
            positional => {
                if options.start_url.is_some() {
                    return Err(format!("unexpected argument: {positional}"));
                }
                options.start_url = Some(positional.to_string());
            }
        }
    }

    if options.start_url.is_none() {
        return Err("a start URL is required".to_string());
    }
    Ok(options)
}

fn build_config(options: &CliOptions) -> Result<CrawlConfig, String> {
    let mut builder = CrawlConfig::builder()
        .start_url(options.start_url.clone().unwrap_or_default())
        .respect_robots(options.respect_robots);
    if let Some(pages) = options.max_pages {
        builder = builder.max_pages(Some(pages));
    }
    if let Some(depth) = options.max_depth {
        builder = builder.max_depth(depth);
    }
    if let Some(workers) = options.workers {
        builder = builder.concurrent_workers(workers);
    }
    if let Some(rpm) = options.rpm {
        builder = builder.requests_per_minute(rpm);
    }
    if let Some(db) = &options.db {
        builder = builder.db_path(db.clone());
    }
    if let Some(dir) = &options.data_dir {
        builder = builder.data_dir(dir.clone());
    }
    builder.build().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("error: {message}");
            }
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    let config = match build_config(&options) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    let bus = Arc::new(EventBus::new(1024));

    if let Some(sequence_path) = &options.sequence {
        let mut cli_tokens = HashMap::new();
        if let Some(start_url) = &options.start_url {
            cli_tokens.insert("startUrl".to_string(), start_url.clone());
        }
        let loader = SequenceConfigLoader::new()
            .with_resolver(Arc::new(StaticTokenResolver::new("cli", cli_tokens)));
        let request = match loader.load(sequence_path) {
            Ok(request) => request,
            Err(e) => {
                eprintln!("error: sequence file: {e}");
                return ExitCode::from(2);
            }
        };

        let facade = Arc::new(OperationsFacade::new(config, Arc::clone(&bus)));
        let runner = SequenceRunner::new(facade, bus);
        let result = runner.run(request).await;
        for step in &result.steps {
            match &step.error {
                Some(error) => println!("step {} ({}): FAILED: {error}", step.step_id, step.operation),
                None => println!("step {} ({}): ok in {} ms", step.step_id, step.operation, step.elapsed_ms),
            }
        }
        return if result.ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(1)
        };
    }

    let crawl = CrawlLoop::new(config, bus);
    match crawl.run().await {
        Ok(summary) => {
            println!(
                "{}: {} pages, {} articles, {} errors in {:.1}s",
                summary.status.as_str(),
                summary.stats.visited,
                summary.stats.articles,
                summary.stats.errors,
                summary.duration.as_secs_f64()
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            if error.downcast_ref::<CrawlLoopError>().is_some_and(|e| {
                matches!(e, CrawlLoopError::DbUnavailable(_))
            }) {
                ExitCode::from(3)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
