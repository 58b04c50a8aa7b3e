//! Ingestion: parse, chunk, embed and store guideline documents.

use crate::chunker;
use crate::embeddings::EmbeddingProvider;
use crate::parser;
use crate::sources::SourceLog;
use crate::store::DocumentStore;
use crate::types::{DocumentChunk, IngestOptions, IngestStats, KnowledgeBaseConfig, SourceRecord};
use chrono::Utc;
use medrag_core::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Deterministic chunk id: re-ingesting unchanged text yields the same ids.
pub fn chunk_id(source_document: &str, position: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_document.as_bytes());
    hasher.update([0]);
    hasher.update(position.to_le_bytes());
    hasher.update([0]);
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Source label stored on chunks: the file name, as evaluation datasets name documents.
pub fn source_document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Read and parse a file. Returns its sections and size in bytes.
pub fn load_document(path: &Path) -> AppResult<(Vec<parser::ParsedSection>, u64)> {
    let byte_count = std::fs::metadata(path)?.len();
    let sections = parser::parse_file(path)?;
    Ok((sections, byte_count))
}

/// Ingest one file, replacing any chunks previously stored for it.
pub async fn ingest_file(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    path: &Path,
) -> AppResult<SourceRecord> {
    let (sections, byte_count) = load_document(path)?;
    index_document(store, embedder, config, path, &sections, byte_count).await
}

/// Chunk, embed and store parsed sections of `path`.
pub async fn index_document(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    path: &Path,
    sections: &[parser::ParsedSection],
    byte_count: u64,
) -> AppResult<SourceRecord> {
    tracing::debug!("Indexing file: {:?}", path);

    let candidates = chunker::chunk_sections(
        sections,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    );

    let source_document = source_document_name(path);
    let indexed_at = Utc::now();
    let mut chunks = Vec::with_capacity(candidates.len());

    let batch_size = config.embedding.batch_size.max(1);
    for batch in candidates.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != batch.len() {
            return Err(AppError::Knowledge(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                batch.len()
            )));
        }

        for (candidate, embedding) in batch.iter().zip(embeddings) {
            chunks.push(DocumentChunk {
                id: chunk_id(&source_document, candidate.position, &candidate.text),
                source_document: source_document.clone(),
                section: candidate.section.clone(),
                position: candidate.position,
                text: candidate.text.clone(),
                embedding,
                indexed_at,
            });
        }
    }

    let (removed, written) = store.replace_source(&source_document, chunks).await?;
    if removed > 0 {
        tracing::debug!("Replaced {} existing chunks of {}", removed, source_document);
    }
    let chunk_count = written as u32;

    tracing::debug!(
        "Processed {:?}: {} chunks, {} bytes",
        path,
        chunk_count,
        byte_count
    );

    Ok(SourceRecord {
        source_id: chunk_id(&source_document, 0, ""),
        path: path.to_string_lossy().into_owned(),
        indexed_at,
        chunk_count,
        byte_count,
    })
}

/// Ingest every matching file under `options.paths`, recording each in the source log.
///
/// Unreadable and unsupported files are skipped with a warning; store and
/// embedding failures abort the run.
pub async fn ingest_paths(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    options: &IngestOptions,
    log: &SourceLog,
) -> AppResult<IngestStats> {
    let start = Instant::now();
    let mut stats = IngestStats::default();

    for path in collect_files(options) {
        let (sections, byte_count) = match load_document(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                stats.skipped_count += 1;
                continue;
            }
        };

        let record = index_document(store, embedder, config, &path, &sections, byte_count).await?;

        log.record(&record)?;
        stats.sources_count += 1;
        stats.chunks_count += record.chunk_count;
        stats.bytes_processed += record.byte_count;
    }

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Ingest completed: {} sources, {} chunks, {} bytes, {} skipped in {:.2}s",
        stats.sources_count,
        stats.chunks_count,
        stats.bytes_processed,
        stats.skipped_count,
        stats.duration_secs
    );

    Ok(stats)
}

fn collect_files(options: &IngestOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            let mut entries: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| should_include(p, options))
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            tracing::warn!("Path does not exist: {:?}", path);
        }
    }

    files
}

/// Check a path against substring include/exclude patterns.
fn should_include(path: &Path, options: &IngestOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::TrigramProvider;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn options(paths: Vec<PathBuf>) -> IngestOptions {
        IngestOptions {
            base_name: "who".to_string(),
            paths,
            include: Vec::new(),
            exclude: Vec::new(),
            reset: false,
            embedding: None,
        }
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = chunk_id("malaria.txt", 0, "Give ACT");
        assert_eq!(a, chunk_id("malaria.txt", 0, "Give ACT"));
        assert_ne!(a, chunk_id("malaria.txt", 1, "Give ACT"));
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_ingest_directory() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("malaria.txt"), "Treat uncomplicated malaria with ACT.\u{c}Severe malaria: artesunate IV.").unwrap();
        std::fs::write(docs.join("tb.md"), "# Tuberculosis\nSix months of HRZE.").unwrap();
        std::fs::write(docs.join("scan.pdf"), b"%PDF-1.7").unwrap();

        let store = MemoryStore::new();
        let embedder = TrigramProvider::new(64);
        let config = KnowledgeBaseConfig::default();
        let log = SourceLog::new(temp.path(), "who");

        let stats = ingest_paths(&store, &embedder, &config, &options(vec![docs]), &log)
            .await
            .unwrap();

        assert_eq!(stats.sources_count, 2);
        assert_eq!(stats.skipped_count, 1);
        assert_eq!(stats.chunks_count, 3);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(log.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("hiv.txt");
        let store = MemoryStore::new();
        let embedder = TrigramProvider::new(64);
        let config = KnowledgeBaseConfig {
            chunk_size: 3,
            chunk_overlap: 0,
            ..Default::default()
        };

        std::fs::write(&file, "one two three four five six").unwrap();
        ingest_file(&store, &embedder, &config, &file).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        std::fs::write(&file, "seven eight").unwrap();
        let record = ingest_file(&store, &embedder, &config, &file).await.unwrap();
        assert_eq!(record.chunk_count, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[test]
    fn test_should_include_patterns() {
        let mut opts = options(Vec::new());
        opts.exclude = vec!["draft".to_string()];
        assert!(should_include(Path::new("who/malaria.txt"), &opts));
        assert!(!should_include(Path::new("who/draft-malaria.txt"), &opts));

        opts.include = vec![".md".to_string()];
        assert!(!should_include(Path::new("who/malaria.txt"), &opts));
        assert!(should_include(Path::new("who/tb.md"), &opts));
    }
}
