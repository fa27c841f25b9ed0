//! Integration tests for the studio pipeline against a SQLite database

use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use qrkit_core::db::Database;
use qrkit_core::services::encoder::{default_encoder, EncodeRequest, EncodedImage, QrEncoder};
use qrkit_core::services::state_store::{
    month_key, Clock, FixedClock, SqliteStateStore, StateStore, QUOTA_KEY,
};
use qrkit_core::{
    Error, ExportFormat, GenerateInput, MemorySink, Notice, Plan, Remaining, Result, Studio,
    StudioConfig,
};
use tempfile::TempDir;

struct Harness {
    studio: Studio,
    sink: Arc<MemorySink>,
    store: Arc<SqliteStateStore>,
    clock: Arc<FixedClock>,
    _temp_dir: TempDir,
}

fn test_config() -> StudioConfig {
    StudioConfig {
        render_size: 160,
        preview_size: 40,
        quiet_interval: Duration::from_millis(100),
        ..StudioConfig::default()
    }
}

/// Helper to create a studio over a fresh test database
async fn create_harness_with(encoder: Arc<dyn QrEncoder>) -> Harness {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db = Database::open(temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create test database");
    let store = Arc::new(SqliteStateStore::new(db.pool.clone()));
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap(),
    ));
    let sink = Arc::new(MemorySink::new());
    let studio = Studio::new(
        test_config(),
        store.clone(),
        clock.clone(),
        encoder,
        sink.clone(),
    )
    .expect("Failed to create studio");

    Harness {
        studio,
        sink,
        store,
        clock,
        _temp_dir: temp_dir,
    }
}

async fn create_harness() -> Harness {
    create_harness_with(Arc::new(default_encoder(test_config().poll))).await
}

async fn generate(studio: &Studio, text: &str) {
    studio.set_input(GenerateInput::new(text)).await.unwrap();
    studio.generate().await.expect("generate should succeed");
}

fn logo_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(24, 24, Rgba([200, 30, 30, 255]));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

// =============================================================================
// Quota gate
// =============================================================================

#[tokio::test]
async fn test_starter_at_limit_refuses_export() {
    let h = create_harness().await;
    h.studio.set_plan(Plan::Starter).await.unwrap();

    let month = month_key(h.clock.now());
    let record = format!(r#"{{"month":"{}","plan":"starter","used":50}}"#, month);
    h.store.put(QUOTA_KEY, &record).await.unwrap();

    generate(&h.studio, "hello").await;
    let err = h.studio.export_as(ExportFormat::Raster).await.unwrap_err();

    assert!(matches!(
        err,
        Error::QuotaExceeded {
            plan: Plan::Starter,
            limit: 50
        }
    ));
    assert_eq!(h.studio.quota_status().await.unwrap().used, 50);
    assert!(h.studio.history().await.unwrap().is_empty());
    assert!(h.sink.saved().is_empty());
}

#[tokio::test]
async fn test_limit_exports_exhaust_free_plan() {
    let h = create_harness().await;
    generate(&h.studio, "count me").await;

    for n in 1..=5 {
        let outcome = h.studio.export_as(ExportFormat::Raster).await.unwrap();
        assert_eq!(outcome.quota.used, n);
    }
    let status = h.studio.quota_status().await.unwrap();
    assert_eq!(status.remaining, Remaining::Limited(0));
    assert!(matches!(
        h.studio.export_as(ExportFormat::Vector).await,
        Err(Error::QuotaExceeded { .. })
    ));

    // Plan switch starts a fresh cycle
    let status = h.studio.set_plan(Plan::Pro).await.unwrap();
    assert_eq!(status.used, 0);
    assert!(h.studio.export_as(ExportFormat::Raster).await.is_ok());
}

#[tokio::test]
async fn test_month_rollover_restores_allowance() {
    let h = create_harness().await;
    generate(&h.studio, "rollover").await;
    for _ in 0..5 {
        h.studio.export_as(ExportFormat::Raster).await.unwrap();
    }
    assert!(h.studio.export_as(ExportFormat::Raster).await.is_err());

    h.clock.set(Utc.with_ymd_and_hms(2026, 4, 15, 12, 0, 0).unwrap());
    let status = h.studio.quota_status().await.unwrap();
    assert_eq!(status.used, 0);
    assert_eq!(status.month, month_key(h.clock.now()));
    assert!(h.studio.export_as(ExportFormat::Raster).await.is_ok());
}

#[tokio::test]
async fn test_enterprise_is_unbounded() {
    let h = create_harness().await;
    h.studio.set_plan(Plan::Enterprise).await.unwrap();
    generate(&h.studio, "lots").await;
    for _ in 0..8 {
        h.studio.export_as(ExportFormat::Raster).await.unwrap();
    }
    let status = h.studio.quota_status().await.unwrap();
    assert_eq!(status.remaining, Remaining::Unbounded);
    assert_eq!(status.limit, None);
}

// =============================================================================
// Export strategies
// =============================================================================

#[tokio::test]
async fn test_empty_text_exports_nothing() {
    let h = create_harness().await;
    h.studio.set_input(GenerateInput::new("")).await.unwrap();
    assert!(matches!(h.studio.generate().await, Err(Error::InputEmpty)));

    for format in ExportFormat::ALL {
        let err = h.studio.export_as(format).await.unwrap_err();
        assert!(matches!(err, Error::InputEmpty));
    }
    assert_eq!(h.studio.quota_status().await.unwrap().used, 0);
}

#[tokio::test]
async fn test_vector_without_logo_is_pure_svg() {
    let h = create_harness().await;
    generate(&h.studio, "https://example.com").await;

    let outcome = h.studio.export_as(ExportFormat::Vector).await.unwrap();
    assert_eq!(outcome.produced, ExportFormat::Vector);
    assert!(outcome.notices.is_empty());

    let saved = &h.sink.saved()[0];
    assert_eq!(saved.mime, "image/svg+xml");
    let markup = String::from_utf8(saved.bytes.clone()).unwrap();
    assert!(markup.contains("<svg"));
    assert!(markup.trim_end().ends_with("</svg>"));
    assert!(!markup.contains("<image"));

    let history = h.studio.history().await.unwrap();
    assert!(history[0]
        .artifact_reference
        .starts_with("data:image/svg+xml;base64,"));
}

#[tokio::test]
async fn test_vector_with_logo_falls_back_to_raster() {
    let h = create_harness().await;
    h.studio.set_input(GenerateInput::new("hello")).await.unwrap();
    h.studio.set_logo(Some(logo_png())).await.unwrap();

    let raster = h.studio.export_as(ExportFormat::Raster).await.unwrap();
    let vector = h.studio.export_as(ExportFormat::Vector).await.unwrap();

    assert_eq!(raster.produced, ExportFormat::Raster);
    assert_eq!(vector.produced, ExportFormat::Raster);
    assert_eq!(vector.notices, vec![Notice::VectorCompositingUnsupported]);
    assert_eq!(vector.filename, "qr-hello.svg");

    let saved = h.sink.saved();
    assert_eq!(saved[0].bytes, saved[1].bytes);
    assert_eq!(saved[1].mime, "image/png");
}

#[tokio::test]
async fn test_document_export_is_pdf() {
    let h = create_harness().await;
    generate(&h.studio, "document").await;

    let outcome = h.studio.export_as(ExportFormat::Document).await.unwrap();
    assert_eq!(outcome.filename, "qr-document.pdf");
    let saved = &h.sink.saved()[0];
    assert!(saved.bytes.starts_with(b"%PDF"));
    let doc = lopdf::Document::load_mem(&saved.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
}

#[tokio::test]
async fn test_filename_extension_matches_format() {
    let h = create_harness().await;
    h.studio.set_plan(Plan::Business).await.unwrap();
    generate(&h.studio, "Ticket #42: entry").await;

    for format in ExportFormat::ALL {
        let outcome = h.studio.export_as(format).await.unwrap();
        assert!(outcome
            .filename
            .ends_with(&format!(".{}", format.extension())));
        assert_eq!(outcome.filename, format!("qr-ticket-42-entry.{}", format.extension()));
    }
}

// =============================================================================
// Logo handling
// =============================================================================

#[tokio::test]
async fn test_logo_swap_and_removal() {
    let h = create_harness().await;
    h.studio.set_input(GenerateInput::new("logo")).await.unwrap();

    let preview = h.studio.set_logo(Some(logo_png())).await.unwrap();
    assert!(preview.artifact().unwrap().has_logo);

    let err = h.studio.set_logo(Some(vec![1, 2, 3])).await.unwrap_err();
    assert!(matches!(err, Error::AssetDecodeFailure(_)));
    let current = h.studio.current().await;
    assert!(!current.artifact().unwrap().has_logo);

    h.studio.set_logo(Some(logo_png())).await.unwrap();
    let preview = h.studio.set_logo(None).await.unwrap();
    assert!(!preview.artifact().unwrap().has_logo);
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_history_newest_first_and_persisted() {
    let h = create_harness().await;
    h.studio.set_plan(Plan::Starter).await.unwrap();
    generate(&h.studio, "first").await;
    h.studio.export_as(ExportFormat::Raster).await.unwrap();
    generate(&h.studio, "second").await;
    h.studio.export_as(ExportFormat::Document).await.unwrap();

    let history = h.studio.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "second");
    assert_eq!(history[0].format, ExportFormat::Document);
    assert_eq!(history[0].plan, Plan::Starter);
    assert_eq!(history[1].filename, "qr-first.png");

    // A second studio over the same store sees the same records
    let reopened = Studio::new(
        test_config(),
        h.store.clone(),
        h.clock.clone(),
        Arc::new(default_encoder(test_config().poll)),
        Arc::new(MemorySink::new()),
    )
    .unwrap();
    assert_eq!(reopened.history().await.unwrap(), history);
    assert_eq!(reopened.quota_status().await.unwrap().used, 2);

    let text = h.studio.export_history_text().await.unwrap().unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("text,format,filename,plan,timestamp"));
    assert!(lines.next().unwrap().starts_with("second,pdf,qr-second.pdf,starter,"));

    h.studio.clear_history().await.unwrap();
    assert!(h.studio.history().await.unwrap().is_empty());
    assert!(h.studio.export_history_text().await.unwrap().is_none());
}

// =============================================================================
// Live preview
// =============================================================================

struct CountingEncoder {
    calls: AtomicU32,
    inner: Arc<dyn QrEncoder>,
}

#[async_trait]
impl QrEncoder for CountingEncoder {
    async fn encode(&self, request: &EncodeRequest) -> Result<EncodedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(request).await
    }
}

#[tokio::test]
async fn test_rapid_edits_recompute_once() {
    let encoder = Arc::new(CountingEncoder {
        calls: AtomicU32::new(0),
        inner: Arc::new(default_encoder(test_config().poll)),
    });
    let h = create_harness_with(encoder.clone()).await;

    let mut handles = Vec::new();
    for text in ["h", "he", "hel", "hell", "hello"] {
        handles.push(
            h.studio
                .input_changed(GenerateInput::new(text))
                .await
                .unwrap(),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(encoder.calls.load(Ordering::SeqCst), 1);
    let current = h.studio.current().await;
    assert_eq!(current.artifact().unwrap().input.text, "hello");
    // Preview refresh never exports
    assert!(h.sink.saved().is_empty());
    assert_eq!(h.studio.quota_status().await.unwrap().used, 0);
}
