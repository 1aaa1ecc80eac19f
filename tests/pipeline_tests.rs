//! End-to-end pipeline tests over in-memory collaborators

mod test_helpers;

use docpipe::{
    ArtifactStore, DocumentAction, ExtractedPage, ExtractedTable, LocalArtifactStore, Orchestrator,
    PipelineConfig, TableCell,
};
use std::sync::Arc;
use test_helpers::*;

fn test_config(target_tokens: usize, overlap_percent: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.chunking.target_tokens = target_tokens;
    config.chunking.overlap_percent = overlap_percent;
    config.chunking.max_chars = 100_000;
    config.performance.max_workers = 2;
    config
}

fn three_page_text() -> Vec<u8> {
    format!(
        "{}\u{0c}{}\u{0c}{}",
        "A".repeat(200),
        "B".repeat(200),
        "C".repeat(200)
    )
    .into_bytes()
}

#[tokio::test]
async fn test_three_page_text_document() {
    // S1: three 50-token pages, no overlap, one chunk per page
    let rig = build_rig(
        test_config(50, 0),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );

    let status = rig.orchestrator.run().await.unwrap();
    assert_eq!(status.total_documents, 1);
    assert!(status.all_succeeded());
    assert_eq!(status.results[0].chunks_indexed, 3);

    assert_eq!(
        rig.store.chunk_ids(),
        vec!["f.txt_p1_c1", "f.txt_p2_c1", "f.txt_p3_c1"]
    );
    for id in rig.store.chunk_ids() {
        let chunk = rig.store.get(&id).unwrap();
        assert_eq!(chunk.token_count, 50);
        assert_eq!(chunk.embedding.as_ref().unwrap().len(), 8);
        assert_eq!(chunk.page.sourcepage, format!("f.txt#page={}", chunk.page.page_num));
    }
}

#[tokio::test]
async fn test_overlap_seeds_following_chunks() {
    // S2: 20% overlap; later chunks carry the 10-token tail of their
    // predecessor, the first chunk is unchanged
    let rig = build_rig(
        test_config(50, 20),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );

    let status = rig.orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());
    assert_eq!(status.results[0].chunks_indexed, 3);

    let c1 = rig.store.get("f.txt_p1_c1").unwrap();
    let c2 = rig.store.get("f.txt_p2_c1").unwrap();
    let c3 = rig.store.get("f.txt_p3_c1").unwrap();

    assert_eq!(c1.text, "A".repeat(200));
    assert!(c2.text.starts_with(&"A".repeat(40)));
    assert!(c2.text.contains(&"B".repeat(200)));
    assert!(c3.text.starts_with(&"B".repeat(40)));
}

#[tokio::test]
async fn test_small_model_budget_adoption() {
    // S3: target 750 exceeds what a 256-token model can carry;
    // effective budget becomes floor(256 * 0.75) = 192
    let text = "word ".repeat(500).into_bytes();
    let rig = build_rig(
        test_config(750, 10),
        vec![("long.txt", text)],
        FakeEmbeddings::new(8, 256),
    );

    let status = rig.orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());

    let budget_warnings: Vec<&String> = status.results[0]
        .warnings
        .iter()
        .filter(|w| w.contains("safe limit"))
        .collect();
    assert_eq!(budget_warnings.len(), 1);

    // Content budget + overlap rider + the seam separator
    let overlap_rider = (192.0f64 * 0.10).round() as usize;
    for id in rig.store.chunk_ids() {
        let chunk = rig.store.get(&id).unwrap();
        assert!(
            chunk.token_count <= 192 + overlap_rider + 1,
            "{} has {} tokens",
            id,
            chunk.token_count
        );
    }
}

#[tokio::test]
async fn test_table_atomicity() {
    // S4: intro text, an oversize table, outro text; the table forms
    // its own chunk carrying the table reference
    let intro = "i".repeat(40);
    let outro = "o".repeat(40);
    let text = format!("{}\n\n{}", intro, outro);

    let table = ExtractedTable::new(
        "t1",
        1,
        1,
        vec![TableCell::new(0, 0, &"T".repeat(320))],
    )
    .at_offset(intro.len() + 2);
    let mut page = ExtractedPage::new(1, &text);
    page.tables.push(table);

    let rig = build_rig(
        test_config(60, 0),
        vec![("doc.txt", b"unused".to_vec())],
        FakeEmbeddings::new(8, 100_000),
    );
    let orchestrator = rig
        .orchestrator
        .clone()
        .with_extractors(Arc::new(FixedResolver::new(Arc::new(CannedExtractor::new(
            vec![page],
        )))));

    let status = orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());
    assert_eq!(status.results[0].chunks_indexed, 3);
    assert!(status.results[0]
        .warnings
        .iter()
        .any(|w| w.contains("oversize")));

    let c1 = rig.store.get("doc.txt_p1_c1").unwrap();
    let c2 = rig.store.get("doc.txt_p1_c2").unwrap();
    let c3 = rig.store.get("doc.txt_p1_c3").unwrap();

    assert!(c1.tables.is_empty());
    assert_eq!(c2.tables, vec!["t1".to_string()]);
    assert!(c2.text.contains(&"T".repeat(320)));
    assert!(c3.tables.is_empty());
    assert!(c3.text.contains(&outro));
}

#[tokio::test]
async fn test_idempotent_replace() {
    // S5: running ADD twice converges to the same indexed set
    let rig = build_rig(
        test_config(50, 0),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );

    let first = rig.orchestrator.run().await.unwrap();
    assert!(first.all_succeeded());
    let ids_after_first = rig.store.chunk_ids();

    let second = rig.orchestrator.run().await.unwrap();
    assert!(second.all_succeeded());
    let ids_after_second = rig.store.chunk_ids();

    assert_eq!(ids_after_first, ids_after_second);
    assert_eq!(ids_after_first.len(), 3);
}

#[tokio::test]
async fn test_partial_page_tolerance_keeps_document() {
    // S6, tolerance on: page 3 fails after retries, the document
    // succeeds with the remaining pages
    let pdf = make_pdf(&["alpha", "bravo", "charlie", "delta", "echo"]);
    let rig = build_rig(
        test_config(100, 0),
        vec![("five.pdf", pdf)],
        FakeEmbeddings::new(8, 1024),
    );
    let orchestrator = rig
        .orchestrator
        .clone()
        .with_extractors(Arc::new(FixedResolver::new(Arc::new(
            FlakyPageExtractor::new(3),
        ))));

    let status = orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());
    assert!(status.results[0]
        .warnings
        .iter()
        .any(|w| w.contains("page 3")));

    let ids = rig.store.chunk_ids();
    let pages: Vec<u32> = ids
        .iter()
        .map(|id| rig.store.get(id).unwrap().page.page_num)
        .collect();
    assert!(pages.contains(&1) && pages.contains(&4));
    assert!(!pages.contains(&3));
}

#[tokio::test]
async fn test_partial_page_tolerance_off_fails_document() {
    // S6, tolerance off: one failed page fails the document
    let pdf = make_pdf(&["alpha", "bravo", "charlie", "delta", "echo"]);
    let mut config = test_config(100, 0);
    config.extraction.partial_page_tolerance = false;

    let rig = build_rig(config, vec![("five.pdf", pdf)], FakeEmbeddings::new(8, 1024));
    let orchestrator = rig
        .orchestrator
        .clone()
        .with_extractors(Arc::new(FixedResolver::new(Arc::new(
            FlakyPageExtractor::new(3),
        ))));

    let status = orchestrator.run().await.unwrap();
    assert_eq!(status.failed, 1);
    assert_eq!(
        status.results[0].error_kind.as_deref(),
        Some("ExtractionFailed")
    );
    assert!(rig.store.chunk_ids().is_empty());
}

#[tokio::test]
async fn test_embedding_order_preserved_across_batches() {
    // P6: many chunks force several batches; every stored vector still
    // matches its own chunk's text
    let text = "alpha beta gamma delta. ".repeat(200).into_bytes();
    let rig = build_rig(
        test_config(20, 0),
        vec![("many.txt", text)],
        FakeEmbeddings::new(4, 100_000),
    );

    let status = rig.orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());

    let ids = rig.store.chunk_ids();
    assert!(ids.len() > 16, "need multiple batches, got {}", ids.len());

    let batch_sizes = rig.provider.batch_sizes.lock().unwrap().clone();
    assert!(batch_sizes.len() > 1);
    assert_eq!(batch_sizes.iter().sum::<usize>(), ids.len());

    for id in ids {
        let chunk = rig.store.get(&id).unwrap();
        let vector = chunk.embedding.unwrap();
        assert_eq!(vector[0], chunk.text.len() as f32, "vector mismatch on {}", id);
    }
}

#[tokio::test]
async fn test_document_level_concurrency_bound() {
    // P7: with two workers, no more than two documents extract at once
    let mut config = test_config(100, 0);
    config.performance.max_workers = 2;

    let files: Vec<(&str, Vec<u8>)> = vec![
        ("a.txt", b"one document".to_vec()),
        ("b.txt", b"two document".to_vec()),
        ("c.txt", b"three document".to_vec()),
        ("d.txt", b"four document".to_vec()),
        ("e.txt", b"five document".to_vec()),
        ("f.txt", b"six document".to_vec()),
    ];

    let counting = Arc::new(CountingExtractor::new());
    let rig = build_rig(config, files, FakeEmbeddings::new(4, 1024));
    let orchestrator = rig
        .orchestrator
        .clone()
        .with_extractors(Arc::new(FixedResolver::new(counting.clone())));

    let status = orchestrator.run().await.unwrap();
    assert_eq!(status.succeeded, 6);

    let peak = counting.peak.load(std::sync::atomic::Ordering::SeqCst);
    assert!(peak <= 2, "peak concurrency was {}", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_embed_failure_fails_document_only() {
    let rig = build_rig(
        test_config(50, 0),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );
    // Exhaust the three-attempt retry budget
    rig.provider.fail_next(3);

    let status = rig.orchestrator.run().await.unwrap();
    assert_eq!(status.failed, 1);
    assert_eq!(
        status.results[0].error_kind.as_deref(),
        Some("TransientNetwork")
    );
    assert!(rig.store.chunk_ids().is_empty());
}

#[tokio::test]
async fn test_embed_retry_recovers() {
    let rig = build_rig(
        test_config(50, 0),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );
    // One transient failure stays within the retry budget
    rig.provider.fail_next(1);

    let status = rig.orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());
    assert_eq!(rig.store.chunk_ids().len(), 3);
}

#[tokio::test]
async fn test_unsupported_format_fails_document() {
    let rig = build_rig(
        test_config(50, 0),
        vec![
            ("good.txt", b"readable text".to_vec()),
            ("weird.bin", vec![0u8, 1, 2]),
        ],
        FakeEmbeddings::new(8, 1024),
    );

    let status = rig.orchestrator.run().await.unwrap();
    assert_eq!(status.total_documents, 2);
    assert_eq!(status.succeeded, 1);

    let failed = status.results.iter().find(|r| !r.success).unwrap();
    assert_eq!(failed.filename, "weird.bin");
    assert_eq!(failed.error_kind.as_deref(), Some("UnsupportedFormat"));
}

#[tokio::test]
async fn test_remove_mode_deletes_chunks_and_artifacts() {
    let store = Arc::new(FakeVectorStore::new(8));
    let provider = Arc::new(FakeEmbeddings::new(8, 1024));
    let artifacts_dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(LocalArtifactStore::new(
        &artifacts_dir.path().to_string_lossy(),
    ));
    let input = Arc::new(FakeInputSource::new(vec![("f.txt", three_page_text())]));
    let counter = Arc::new(docpipe::CharacterTokenCounter::new(4));

    let add = Orchestrator::new(
        test_config(50, 0),
        input.clone(),
        artifacts.clone(),
        Arc::new(docpipe::DisabledDescriber),
        counter.clone(),
        provider.clone(),
        store.clone(),
    )
    .with_retry_policies(fast_policies());
    assert!(add.run().await.unwrap().all_succeeded());
    assert_eq!(store.chunk_ids().len(), 3);
    assert!(!artifacts.list("documents/").await.unwrap().is_empty());

    let mut remove_config = test_config(50, 0);
    remove_config.action.document_action = DocumentAction::Remove;
    remove_config.action.cleanup_artifacts = true;

    let remove = Orchestrator::new(
        remove_config,
        input,
        artifacts.clone(),
        Arc::new(docpipe::DisabledDescriber),
        counter,
        provider,
        store.clone(),
    )
    .with_retry_policies(fast_policies());
    let status = remove.run().await.unwrap();

    assert!(status.all_succeeded());
    assert!(store.chunk_ids().is_empty());
    assert!(artifacts.list("documents/").await.unwrap().is_empty());
    assert!(artifacts.list("f/").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_all_mode() {
    let store = Arc::new(FakeVectorStore::new(8));
    let provider = Arc::new(FakeEmbeddings::new(8, 1024));
    let artifacts_dir = tempfile::tempdir().unwrap();
    let artifacts = Arc::new(LocalArtifactStore::new(
        &artifacts_dir.path().to_string_lossy(),
    ));
    let input = Arc::new(FakeInputSource::new(vec![
        ("a.txt", three_page_text()),
        ("b.txt", three_page_text()),
    ]));
    let counter = Arc::new(docpipe::CharacterTokenCounter::new(4));
    let describer = Arc::new(docpipe::DisabledDescriber);

    let add = Orchestrator::new(
        test_config(50, 0),
        input.clone(),
        artifacts.clone(),
        describer.clone(),
        counter.clone(),
        provider.clone(),
        store.clone(),
    )
    .with_retry_policies(fast_policies());
    assert!(add.run().await.unwrap().all_succeeded());
    assert_eq!(store.chunk_ids().len(), 6);

    let mut config = test_config(50, 0);
    config.action.document_action = DocumentAction::RemoveAll;
    let wipe = Orchestrator::new(
        config,
        input,
        artifacts,
        describer,
        counter,
        provider,
        store.clone(),
    )
    .with_retry_policies(fast_policies());

    let status = wipe.run().await.unwrap();
    assert_eq!(status.total_documents, 0);
    assert!(store.chunk_ids().is_empty());
}

#[tokio::test]
async fn test_run_summary_and_manifest_written() {
    let rig = build_rig(
        test_config(50, 0),
        vec![("f.txt", three_page_text())],
        FakeEmbeddings::new(8, 1024),
    );
    assert!(rig.orchestrator.run().await.unwrap().all_succeeded());

    let artifacts = LocalArtifactStore::new(&rig.artifacts_dir.path().to_string_lossy());
    let summaries = artifacts.list("status/run-").await.unwrap();
    assert_eq!(summaries.len(), 1);

    let manifests = artifacts.list("f/manifest.json").await.unwrap();
    assert_eq!(manifests.len(), 1);

    let full_doc = artifacts.list("documents/f.txt").await.unwrap();
    assert_eq!(full_doc.len(), 1);
}

#[tokio::test]
async fn test_integrated_vectorization_skips_embedding() {
    let mut config = test_config(50, 0);
    config.embeddings.integrated_vectorization = true;

    let artifacts_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeEmbeddings::new(8, 1024));
    let store = Arc::new(FakeVectorStore::new(8).with_integrated());

    let orchestrator = Orchestrator::new(
        config,
        Arc::new(FakeInputSource::new(vec![("f.txt", three_page_text())])),
        Arc::new(LocalArtifactStore::new(
            &artifacts_dir.path().to_string_lossy(),
        )),
        Arc::new(docpipe::DisabledDescriber),
        Arc::new(docpipe::CharacterTokenCounter::new(4)),
        provider.clone(),
        store.clone(),
    )
    .with_retry_policies(fast_policies());

    let status = orchestrator.run().await.unwrap();
    assert!(status.all_succeeded());

    // The provider was never called; chunks carry no client vectors
    assert!(provider.batch_sizes.lock().unwrap().is_empty());
    for id in store.chunk_ids() {
        assert!(store.get(&id).unwrap().embedding.is_none());
    }
}
