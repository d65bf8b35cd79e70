//! Trace-pipe reader and batcher.
//!
//! Reads the node's trace feed line by line, parses each record, and hands
//! size- or time-bounded batches to the processor. Lines that fail to parse
//! are skipped; the node interleaves occasional non-JSON diagnostics into
//! the pipe.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::decoding::trace::TraceRecord;

pub async fn read_trace_pipe(
    path: &Path,
    batch_size: usize,
    flush_interval: Duration,
    tx: mpsc::Sender<Vec<TraceRecord>>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let file = File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut batch: Vec<TraceRecord> = Vec::with_capacity(batch_size);
    let mut flush = tokio::time::interval(flush_interval);
    flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("trace reader cancelled");
                return Ok(());
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<TraceRecord>(line) {
                    Ok(record) => {
                        batch.push(record);
                        if batch.len() >= batch_size
                            && tx.send(std::mem::take(&mut batch)).await.is_err()
                        {
                            return Ok(());
                        }
                    }
                    Err(e) => tracing::debug!("skipping unparseable trace line: {e}"),
                }
            }

            _ = flush.tick() => {
                if !batch.is_empty() && tx.send(std::mem::take(&mut batch)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(batch).await;
    }
    tracing::info!("trace pipe reached end of input");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_fixture(name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", name, std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        path
    }

    #[tokio::test]
    async fn batches_split_by_size_and_flush_at_eof() {
        let path = write_fixture(
            "trace-reader-batches",
            &[
                r#"{"operation":"write","key":"AA==","value":"","metadata":{"blockHeight":1},"blockTimeUnixMs":1}"#,
                "not json at all",
                r#"{"operation":"write","key":"AA==","value":"","metadata":{"blockHeight":2},"blockTimeUnixMs":2}"#,
                r#"{"operation":"delete","key":"AA==","value":"","metadata":{"blockHeight":3},"blockTimeUnixMs":3}"#,
            ],
        );

        let (tx, mut rx) = mpsc::channel(4);
        read_trace_pipe(
            &path,
            2,
            Duration::from_secs(60),
            tx,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        std::fs::remove_file(&path).ok();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].metadata.block_height, 1);
        assert_eq!(first[1].metadata.block_height, 2);

        // The trailing record flushes when the pipe ends.
        let second = rx.recv().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].metadata.block_height, 3);

        assert!(rx.recv().await.is_none());
    }
}
