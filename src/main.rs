//! Trackbot 命令行 REPL
//!
//! 启动: cargo run -- [--user <id>] [--config <path>]
//! 每行输入即一个回合，同一用户共享一个线程；输入 exit / quit 结束。

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use trackbot::agent::{create_agent, TurnRequest};
use trackbot::config::{load_config, AppConfig};
use trackbot::observability;

struct CliArgs {
    user: Option<String>,
    config: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut parsed = CliArgs { user: None, config: None };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--user" => parsed.user = args.next(),
            "--config" => parsed.config = args.next().map(PathBuf::from),
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args();
    let cfg = load_config(args.config).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    let user_id = args.user.unwrap_or_else(|| cfg.app.default_user_id.clone());

    let agent = create_agent(&cfg).await.context("Failed to create agent")?;
    println!(
        "{} ready (user: {user_id}). Type 'exit' or 'quit' to leave.",
        cfg.app.display_name()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match agent.process_turn(TurnRequest::new(user_id.clone(), line)).await {
            Ok(resp) => println!("Agent: {}", resp.answer),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    println!("Bye.");
    Ok(())
}
