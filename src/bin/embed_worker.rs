//! Standalone embedding worker process, spawned by
//! [`claude_rag_engine::adapters::embedding::worker::embed_via_workers`]
//! (spec.md §4.5: process-parallel, not thread-parallel, misses).
//!
//! Reads a single newline-delimited JSON request from stdin, loads its
//! model on first use, embeds the batch, and writes a single
//! newline-delimited JSON response to stdout before exiting.

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct WorkerRequest {
    model: String,
    texts: Vec<String>,
}

#[derive(Serialize)]
struct WorkerResponse {
    vectors: Option<Vec<Vec<f32>>>,
    error: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut input = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut input) {
        emit(WorkerResponse { vectors: None, error: Some(format!("failed to read stdin: {e}")) });
        return;
    }

    let request: WorkerRequest = match serde_json::from_str(input.trim()) {
        Ok(r) => r,
        Err(e) => {
            emit(WorkerResponse { vectors: None, error: Some(format!("invalid request: {e}")) });
            return;
        }
    };

    let response = match run(request).await {
        Ok(vectors) => WorkerResponse { vectors: Some(vectors), error: None },
        Err(e) => WorkerResponse { vectors: None, error: Some(e) },
    };
    emit(response);
}

#[cfg(feature = "fastembed")]
async fn run(request: WorkerRequest) -> Result<Vec<Vec<f32>>, String> {
    use claude_rag_engine::adapters::embedding::FastEmbedProvider;
    use claude_rag_engine::domain::ports::embedding::EmbeddingProvider;
    use claude_rag_engine::domain::types::EmbeddingModel;

    let model = EmbeddingModel::parse(&request.model).map_err(|e| e.to_string())?;
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("claude-rag")
        .join("fastembed");
    let provider = FastEmbedProvider::new(model, cache_dir).map_err(|e| e.to_string())?;
    provider.embed_batch(&request.texts).await.map_err(|e| e.to_string())
}

#[cfg(not(feature = "fastembed"))]
async fn run(request: WorkerRequest) -> Result<Vec<Vec<f32>>, String> {
    use claude_rag_engine::adapters::embedding::MockEmbeddingProvider;
    use claude_rag_engine::domain::ports::embedding::EmbeddingProvider;
    use claude_rag_engine::domain::types::EmbeddingModel;

    let model = EmbeddingModel::parse(&request.model).map_err(|e| e.to_string())?;
    let provider = MockEmbeddingProvider::new(model.dimensions());
    provider.embed_batch(&request.texts).await.map_err(|e| e.to_string())
}

fn emit(response: WorkerResponse) {
    let line = serde_json::to_string(&response).unwrap_or_else(|e| {
        format!("{{\"vectors\":null,\"error\":\"failed to serialize response: {e}\"}}")
    });
    let mut stdout = std::io::stdout();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}
