//! conway-ctl — command-line client for the Conway dispatcher.

use anyhow::{Context, Result};

use conway_core::JobRequest;

mod cmd;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ES_URL: &str = "http://localhost:9200";
const DEFAULT_INDEX: &str = "observabilidade";

fn print_usage() {
    println!("Usage: conway-ctl [options] <command>");
    println!();
    println!("Commands:");
    println!("  submit <mpi|spark> <powmin> <powmax>   Run one job and print the result");
    println!("  mapping                                Print the telemetry index mapping");
    println!("  init-index                             Recreate the telemetry index");
    println!();
    println!("Options:");
    println!("  --host <host>    Dispatcher host (default: {})", DEFAULT_HOST);
    println!("  --port <port>    Dispatcher port (default: {})", DEFAULT_PORT);
    println!("  --es <url>       Document store URL (default: {})", DEFAULT_ES_URL);
    println!("  --index <name>   Telemetry index (default: {})", DEFAULT_INDEX);
}

fn parse_power(name: &str, raw: &str) -> Result<i64> {
    raw.parse()
        .with_context(|| format!("{} must be an integer, got {:?}", name, raw))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut host = DEFAULT_HOST.to_string();
    let mut port = DEFAULT_PORT;
    let mut es_url = DEFAULT_ES_URL.to_string();
    let mut index = DEFAULT_INDEX.to_string();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = args.get(i).context("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--es" => {
                i += 1;
                es_url = args.get(i).context("--es requires a value")?.clone();
            }
            "--index" => {
                i += 1;
                index = args.get(i).context("--index requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["submit", engine, powmin, powmax] => {
            let request = JobRequest {
                engine: engine.to_string(),
                powmin: parse_power("powmin", powmin)?,
                powmax: parse_power("powmax", powmax)?,
            };
            cmd::submit::cmd_submit(&host, port, request).await
        }
        ["mapping"]                        => cmd::index::cmd_mapping(),
        ["init-index"]                     => cmd::index::cmd_init_index(&es_url, &index).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
