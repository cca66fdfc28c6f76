//! Process-parallel fanout for embedding generation (spec.md §4.5: real
//! OS processes, not threads, each lazily loading its own copy of the
//! model on first use).
//!
//! Misses are partitioned round-robin across `parallel_workers` children,
//! each running [`crate::bin::embed_worker`] (built as a separate binary:
//! `src/bin/embed_worker.rs`). A child receives its partition as a single
//! newline-delimited JSON array of strings on stdin and replies with a
//! single newline-delimited JSON array of vectors on stdout, then exits.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::domain::error::{Error, Result};
use crate::domain::types::EmbeddingModel;

#[derive(Serialize)]
struct WorkerRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
struct WorkerResponse {
    vectors: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

/// Splits `texts` into `workers` round-robin partitions, spawns one
/// `embed_worker` child per non-empty partition, and reassembles the
/// results in the caller's original order.
pub async fn embed_via_workers(texts: &[String], workers: usize) -> Result<Vec<Vec<f32>>> {
    embed_via_workers_with_model(texts, workers, EmbeddingModel::default().as_str()).await
}

/// As [`embed_via_workers`], naming the model each child should load.
pub async fn embed_via_workers_with_model(
    texts: &[String],
    workers: usize,
    model: &str,
) -> Result<Vec<Vec<f32>>> {
    let workers = workers.max(1);
    let mut partitions: Vec<Vec<(usize, String)>> = vec![Vec::new(); workers];
    for (i, text) in texts.iter().enumerate() {
        partitions[i % workers].push((i, text.clone()));
    }

    let mut handles = Vec::with_capacity(workers);
    for partition in partitions.into_iter().filter(|p| !p.is_empty()) {
        let model = model.to_string();
        handles.push(tokio::spawn(async move {
            let indices: Vec<usize> = partition.iter().map(|(i, _)| *i).collect();
            let texts: Vec<String> = partition.into_iter().map(|(_, t)| t).collect();
            let vectors = run_worker(&model, &texts).await?;
            Ok::<_, Error>(indices.into_iter().zip(vectors).collect::<Vec<_>>())
        }));
    }

    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    for handle in handles {
        let pairs = handle
            .await
            .map_err(|e| Error::internal(format!("embed worker task panicked: {e}")))??;
        for (idx, vector) in pairs {
            ordered[idx] = Some(vector);
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| Error::internal(format!("worker never returned vector for index {i}"))))
        .collect()
}

async fn run_worker(model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let exe = std::env::current_exe()
        .map_err(|e| Error::internal(format!("cannot locate own executable: {e}")))?;
    let binary = exe
        .parent()
        .map(|dir| dir.join("embed_worker"))
        .unwrap_or_else(|| "embed_worker".into());

    let mut child = Command::new(binary)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| Error::internal(format!("failed to spawn embed_worker: {e}")))?;

    let request = WorkerRequest { model, texts };
    let mut line = serde_json::to_string(&request).map_err(Error::from)?;
    line.push('\n');

    let mut stdin = child.stdin.take().expect("piped stdin");
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::internal(format!("failed writing to embed_worker stdin: {e}")))?;
    drop(stdin);

    let stdout = child.stdout.take().expect("piped stdout");
    let mut reader = BufReader::new(stdout);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(|e| Error::internal(format!("failed reading embed_worker stdout: {e}")))?;

    let status = child
        .wait()
        .await
        .map_err(|e| Error::internal(format!("failed waiting for embed_worker: {e}")))?;
    if !status.success() {
        return Err(Error::internal(format!("embed_worker exited with {status}")));
    }

    let response: WorkerResponse = serde_json::from_str(response_line.trim()).map_err(Error::from)?;
    if let Some(error) = response.error {
        return Err(Error::embedding(error));
    }
    response
        .vectors
        .ok_or_else(|| Error::internal("embed_worker returned neither vectors nor error".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_as_single_line_json() {
        let req = WorkerRequest { model: "m", texts: &["a".to_string(), "b".to_string()] };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"texts\":[\"a\",\"b\"]"));
    }

    #[tokio::test]
    async fn round_robin_partitions_preserve_all_indices() {
        let texts: Vec<String> = (0..7).map(|i| format!("t{i}")).collect();
        let mut partitions: Vec<Vec<(usize, String)>> = vec![Vec::new(); 3];
        for (i, text) in texts.iter().enumerate() {
            partitions[i % 3].push((i, text.clone()));
        }
        let total: usize = partitions.iter().map(|p| p.len()).sum();
        assert_eq!(total, texts.len());
    }
}
