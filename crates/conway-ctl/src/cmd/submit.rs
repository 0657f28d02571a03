//! `submit` — send one job to the dispatcher and print the reply.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use conway_core::{ClientReply, JobRequest, ReplyStatus};

pub async fn cmd_submit(host: &str, port: u16, request: JobRequest) -> Result<()> {
    let addr = format!("{host}:{port}");
    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to conwayd at {addr} — is it running?"))?;

    let payload = serde_json::to_vec(&request).context("failed to encode request")?;
    stream
        .write_all(&payload)
        .await
        .context("failed to send request")?;

    // Replies end with a newline; the malformed-request envelope ends with
    // the connection instead.
    let mut line = String::new();
    BufReader::new(&mut stream)
        .read_line(&mut line)
        .await
        .context("failed to read reply")?;
    if line.trim().is_empty() {
        anyhow::bail!("conwayd closed the connection without replying");
    }

    match serde_json::from_str::<ClientReply>(&line) {
        Ok(reply) => print_reply(&request, &reply),
        Err(_) => {
            let raw: serde_json::Value =
                serde_json::from_str(&line).context("failed to parse reply")?;
            let message = raw
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unrecognised reply");
            anyhow::bail!("request rejected: {message}");
        }
    }

    Ok(())
}

fn print_reply(request: &JobRequest, reply: &ClientReply) {
    println!("═══════════════════════════════════════");
    println!(
        "  {} job  powmin={} powmax={}",
        request.engine, request.powmin, request.powmax
    );
    println!("═══════════════════════════════════════");
    println!("  Request ID : {}", reply.request_id);
    println!("  Status     : {}", reply.status.as_str());

    match reply.status {
        ReplyStatus::Ok => {
            let data = reply.data.as_deref().unwrap_or("");
            if data.trim().is_empty() {
                println!("\n  (empty result)");
            } else {
                println!();
                for line in data.lines() {
                    println!("  {}", line);
                }
            }
        }
        ReplyStatus::Error => {
            println!("  Error      : {}", reply.error.as_deref().unwrap_or("unknown"));
        }
    }
}
