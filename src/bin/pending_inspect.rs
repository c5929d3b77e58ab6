//! Pending Queue Inspector
//!
//! Prints the records still waiting for delivery in a data directory,
//! decoded field by field. Read-only; safe to run next to a live agent.
//!
//! Usage: cargo run --bin pending-inspect [data_dir]

use std::env;
use std::path::PathBuf;

const QUEUE_FILE: &str = "pending_posts.txt";

fn main() -> anyhow::Result<()> {
    let data_dir = PathBuf::from(env::args().nth(1).unwrap_or_else(|| "data".to_string()));
    let path = data_dir.join(QUEUE_FILE);

    println!("Pending queue: {}", path.display());

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("  (empty - no queue file)");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let torn = !content.is_empty() && !content.ends_with('\n');
    let records: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    println!("  {} record(s)", records.len());
    println!();

    for (idx, record) in records.iter().enumerate() {
        let is_last = idx + 1 == records.len();
        if torn && is_last {
            println!("#{} (unterminated, will be dropped on next start)", idx + 1);
        } else {
            println!("#{}", idx + 1);
        }
        for (key, value) in decode_fields(record) {
            println!("   {:<10} {}", key, value);
        }
    }

    Ok(())
}

fn decode_fields(record: &str) -> Vec<(String, String)> {
    record
        .split('&')
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), decode(value))
        })
        .collect()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}
