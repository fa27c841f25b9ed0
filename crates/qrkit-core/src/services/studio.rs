//! Studio: the single owner of the composition cache and quota accounting
//!
//! Every mutation of the current composition, the logo, and the quota record
//! goes through one `Studio`. Recomputes carry a monotonically increasing
//! request id; a result is committed only if no newer request has committed
//! already, so a slow stale encode can never overwrite a fresher preview.
//! A ledger lock serializes every quota and history write; exports hold it
//! across gate, produce, save, and accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use image::RgbaImage;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::{StudioConfig, DEFAULT_LOGO_FRACTION, MAX_LOGO_FRACTION};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::services::compositor::{self, HexColor, LogoOverlay};
use crate::services::encoder::{
    default_encoder, EcLevel, EncodeRequest, OutputMode, QrEncoder,
};
use crate::services::export::{export_filename, ArtifactSink, ExportFormat, ExportStrategy, Notice};
use crate::services::history::{export_text, HistoryEntry, HistoryLog};
use crate::services::logo::{decode_logo, LogoAsset};
use crate::services::quota::{quota_exceeded, Plan, QuotaStatus, QuotaStore};
use crate::services::scheduler::PreviewScheduler;
use crate::services::state_store::{Clock, SqliteStateStore, StateStore, SystemClock};

// ============================================================================
// Types
// ============================================================================

/// User-controlled composition input
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateInput {
    pub text: String,
    pub dark: HexColor,
    pub light: HexColor,
    /// Logo edge as a fraction of the surface width, in (0, 0.5]
    pub logo_fraction: f32,
}

impl Default for GenerateInput {
    fn default() -> Self {
        Self {
            text: String::new(),
            dark: HexColor::BLACK,
            light: HexColor::WHITE,
            logo_fraction: DEFAULT_LOGO_FRACTION,
        }
    }
}

impl GenerateInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.logo_fraction > 0.0 && self.logo_fraction <= MAX_LOGO_FRACTION) {
            return Err(Error::validation(format!(
                "Logo size must be within (0, {}], got {}",
                MAX_LOGO_FRACTION, self.logo_fraction
            )));
        }
        Ok(())
    }
}

/// The current QR+logo raster, never persisted
#[derive(Debug, Clone)]
pub struct ComposedArtifact {
    pub request_id: u64,
    pub input: GenerateInput,
    pub ec_level: EcLevel,
    pub has_logo: bool,
    /// Full export-resolution surface
    pub surface: RgbaImage,
    /// Down-scaled display copy
    pub preview: RgbaImage,
}

/// What the preview currently shows
#[derive(Debug, Clone)]
pub enum PreviewState {
    /// No text entered
    Empty,
    /// The encoder rejected the input; exports are disabled
    Failed(String),
    Ready(Arc<ComposedArtifact>),
}

impl PreviewState {
    pub fn artifact(&self) -> Option<&Arc<ComposedArtifact>> {
        match self {
            PreviewState::Ready(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub requested: ExportFormat,
    pub produced: ExportFormat,
    pub filename: String,
    /// Where the sink put the artifact
    pub location: String,
    pub notices: Vec<Notice>,
    /// Quota after this export was counted
    pub quota: QuotaStatus,
}

struct StudioState {
    input: GenerateInput,
    logo: Option<LogoAsset>,
    /// Bumped on every logo replace or clear
    logo_generation: u64,
    preview: PreviewState,
    committed_id: u64,
}

struct StudioInner {
    config: StudioConfig,
    encoder: Arc<dyn QrEncoder>,
    sink: Arc<dyn ArtifactSink>,
    quota: QuotaStore,
    history: HistoryLog,
    scheduler: PreviewScheduler,
    state: Mutex<StudioState>,
    next_request: AtomicU64,
    ledger_lock: Mutex<()>,
}

// ============================================================================
// Studio
// ============================================================================

/// Composition, export, and quota pipeline
#[derive(Clone)]
pub struct Studio {
    inner: Arc<StudioInner>,
}

impl Studio {
    pub fn new(
        config: StudioConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        encoder: Arc<dyn QrEncoder>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Result<Self> {
        config.validate()?;

        let quota = QuotaStore::new(Arc::clone(&store), clock, config.default_plan);
        let history = HistoryLog::new(store, config.history_cap);
        let scheduler = PreviewScheduler::new(config.quiet_interval);

        Ok(Self {
            inner: Arc::new(StudioInner {
                config,
                encoder,
                sink,
                quota,
                history,
                scheduler,
                state: Mutex::new(StudioState {
                    input: GenerateInput::default(),
                    logo: None,
                    logo_generation: 0,
                    preview: PreviewState::Empty,
                    committed_id: 0,
                }),
                next_request: AtomicU64::new(0),
                ledger_lock: Mutex::new(()),
            }),
        })
    }

    /// Studio over a SQLite database with the wall clock and the `qrcode` encoder
    pub fn open(db: &Database, config: StudioConfig, sink: Arc<dyn ArtifactSink>) -> Result<Self> {
        let store = Arc::new(SqliteStateStore::new(db.pool.clone()));
        let encoder = Arc::new(default_encoder(config.poll));
        Self::new(config, store, Arc::new(SystemClock), encoder, sink)
    }

    pub fn config(&self) -> &StudioConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Input and composition
    // ------------------------------------------------------------------------

    /// Replace the input without recomputing
    pub async fn set_input(&self, input: GenerateInput) -> Result<()> {
        input.validate()?;
        self.inner.state.lock().await.input = input;
        Ok(())
    }

    pub async fn input(&self) -> GenerateInput {
        self.inner.state.lock().await.input.clone()
    }

    /// Replace the input and schedule a debounced recompute
    pub async fn input_changed(&self, input: GenerateInput) -> Result<JoinHandle<()>> {
        self.set_input(input).await?;
        let studio = self.clone();
        Ok(self.inner.scheduler.schedule(move || async move {
            if let Err(e) = studio.refresh().await {
                log::warn!("[studio] Scheduled recompute failed: {}", e);
            }
        }))
    }

    /// Recompute the composition from the current input
    ///
    /// # Errors
    /// `InputEmpty` when there is no text (the preview becomes empty);
    /// `EncodingFailure` when the encoder rejects the input (the previous
    /// composition is dropped and exports are disabled).
    pub async fn generate(&self) -> Result<PreviewState> {
        let id = self.inner.next_request.fetch_add(1, Ordering::SeqCst) + 1;
        let (input, logo, logo_generation) = {
            let state = self.inner.state.lock().await;
            (state.input.clone(), state.logo.clone(), state.logo_generation)
        };

        if input.is_empty() {
            self.commit(id, logo_generation, PreviewState::Empty).await;
            return Err(Error::InputEmpty);
        }

        match self.compose(id, input, logo).await {
            Ok(artifact) => Ok(self
                .commit(id, logo_generation, PreviewState::Ready(Arc::new(artifact)))
                .await),
            Err(e) => {
                log::warn!("[studio] Composition failed: {}", e);
                self.commit(id, logo_generation, PreviewState::Failed(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// `generate`, with an empty input treated as success
    async fn refresh(&self) -> Result<PreviewState> {
        match self.generate().await {
            Err(Error::InputEmpty) => Ok(PreviewState::Empty),
            other => other,
        }
    }

    async fn compose(
        &self,
        request_id: u64,
        input: GenerateInput,
        logo: Option<LogoAsset>,
    ) -> Result<ComposedArtifact> {
        let config = &self.inner.config;
        let request = EncodeRequest {
            text: input.text.clone(),
            size: config.render_size,
            dark: input.dark,
            light: input.light,
            ec_level: config.ec_level,
            mode: OutputMode::Raster,
        };
        let encoded = self.inner.encoder.encode(&request).await?.into_raster()?;

        let has_logo = logo.is_some();
        let (size, preview_size, pad) = (config.render_size, config.preview_size, config.pad);
        let (background, fraction) = (input.light, input.logo_fraction);

        let (surface, preview) = tokio::task::spawn_blocking(move || {
            let overlay = logo.as_ref().map(|asset| LogoOverlay {
                asset,
                fraction,
                pad,
            });
            let surface = compositor::compose(&encoded, size, background, overlay);
            let preview = compositor::preview(&surface, preview_size);
            (surface, preview)
        })
        .await?;

        log::debug!(
            "[studio] Composed request {} ({}px, logo: {})",
            request_id,
            size,
            has_logo
        );

        Ok(ComposedArtifact {
            request_id,
            input,
            ec_level: config.ec_level,
            has_logo,
            surface,
            preview,
        })
    }

    /// Install a result unless something newer already landed
    async fn commit(&self, id: u64, logo_generation: u64, next: PreviewState) -> PreviewState {
        let mut state = self.inner.state.lock().await;
        if id <= state.committed_id || logo_generation != state.logo_generation {
            log::warn!(
                "[studio] Discarding stale recompute {} (current {})",
                id,
                state.committed_id
            );
            return state.preview.clone();
        }
        state.committed_id = id;
        state.preview = next;
        state.preview.clone()
    }

    /// The current preview
    pub async fn current(&self) -> PreviewState {
        self.inner.state.lock().await.preview.clone()
    }

    /// Reset input and logo to defaults and drop the composition
    pub async fn clear(&self) -> Result<()> {
        self.inner.scheduler.cancel();
        {
            let mut state = self.inner.state.lock().await;
            state.input = GenerateInput::default();
            state.logo = None;
            state.logo_generation += 1;
        }
        self.refresh().await.map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Logo
    // ------------------------------------------------------------------------

    /// Replace (`Some`) or remove (`None`) the logo, then recompose
    ///
    /// The previous logo is invalidated before decoding starts. On a decode
    /// failure the studio recomposes without a logo and reports
    /// `AssetDecodeFailure`.
    pub async fn set_logo(&self, bytes: Option<Vec<u8>>) -> Result<PreviewState> {
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.logo = None;
            state.logo_generation += 1;
            state.logo_generation
        };

        let decode_error = match bytes {
            None => None,
            Some(bytes) => match decode_logo(bytes).await {
                Ok(asset) => {
                    let mut state = self.inner.state.lock().await;
                    if state.logo_generation == generation {
                        state.logo = Some(asset);
                    } else {
                        log::debug!("[studio] Logo superseded while decoding");
                    }
                    None
                }
                Err(e) => {
                    log::warn!("[studio] {}; continuing without a logo", e);
                    Some(e)
                }
            },
        };

        let refreshed = self.refresh().await;
        match decode_error {
            Some(e) => {
                if let Err(recompose) = refreshed {
                    log::warn!("[studio] Recompose without logo failed: {}", recompose);
                }
                Err(e)
            }
            None => refreshed,
        }
    }

    pub async fn has_logo(&self) -> bool {
        self.inner.state.lock().await.logo.is_some()
    }

    // ------------------------------------------------------------------------
    // Quota
    // ------------------------------------------------------------------------

    pub async fn quota_status(&self) -> Result<QuotaStatus> {
        let _guard = self.inner.ledger_lock.lock().await;
        let state = self.inner.quota.load().await?;
        Ok(QuotaStatus::from(&state))
    }

    /// Switch plan; usage restarts at zero
    pub async fn set_plan(&self, plan: Plan) -> Result<QuotaStatus> {
        let _guard = self.inner.ledger_lock.lock().await;
        let mut state = self.inner.quota.load().await?;
        self.inner.quota.set_plan(&mut state, plan).await?;
        Ok(QuotaStatus::from(&state))
    }

    // ------------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------------

    /// Export the current composition
    ///
    /// Gate, produce, save, then count. Once the save step has been reached
    /// the export is counted and logged even if saving fails; that error is
    /// returned afterwards.
    pub async fn export_as(&self, format: ExportFormat) -> Result<ExportOutcome> {
        let _guard = self.inner.ledger_lock.lock().await;

        let composition = {
            let state = self.inner.state.lock().await;
            match (&state.preview, state.input.is_empty()) {
                (PreviewState::Ready(artifact), _) => Arc::clone(artifact),
                (_, true) => return Err(Error::InputEmpty),
                (_, false) => return Err(Error::NoComposition),
            }
        };

        let quota = &self.inner.quota;
        let mut quota_state = quota.load().await?;
        if !quota.can_consume(&quota_state) {
            log::info!(
                "[studio] Export refused: {} quota exhausted ({} used)",
                quota_state.plan,
                quota_state.used
            );
            return Err(quota_exceeded(&quota_state));
        }

        let strategy = ExportStrategy::for_format(format, self.inner.config.page);
        let artifact = strategy
            .produce(&composition, self.inner.encoder.as_ref())
            .await?;

        let filename = export_filename(&composition.input.text, format);
        let saved = self.inner.sink.save(&filename, &artifact).await;
        if let Err(e) = &saved {
            log::warn!("[studio] Save of {} failed after production: {}", filename, e);
        }

        quota.consume(&mut quota_state).await?;
        self.inner
            .history
            .append(HistoryEntry {
                text: composition.input.text.clone(),
                format,
                timestamp: Utc::now(),
                filename: filename.clone(),
                plan: quota_state.plan,
                artifact_reference: artifact.reference.clone(),
            })
            .await?;

        let location = saved?;
        log::info!(
            "[studio] Exported {} as {} ({} remaining)",
            filename,
            artifact.produced,
            quota_state.remaining()
        );

        Ok(ExportOutcome {
            requested: format,
            produced: artifact.produced,
            filename,
            location,
            notices: artifact.notices,
            quota: QuotaStatus::from(&quota_state),
        })
    }

    // ------------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------------

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.inner.history.list().await
    }

    pub async fn clear_history(&self) -> Result<()> {
        let _guard = self.inner.ledger_lock.lock().await;
        self.inner.history.clear().await
    }

    /// Tabular text of the whole history; `None` when it is empty
    pub async fn export_history_text(&self) -> Result<Option<String>> {
        let entries = self.inner.history.list().await?;
        if entries.is_empty() {
            return Ok(None);
        }
        export_text(&entries).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::encoder::{EncodedImage, PollPolicy};
    use crate::services::export::MemorySink;
    use crate::services::state_store::{FixedClock, MemoryStateStore, HISTORY_KEY};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::time::Duration;

    fn small_config() -> StudioConfig {
        StudioConfig {
            render_size: 128,
            preview_size: 32,
            ..StudioConfig::default()
        }
    }

    fn studio_with(encoder: Arc<dyn QrEncoder>) -> (Studio, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()));
        let studio = Studio::new(
            small_config(),
            Arc::new(MemoryStateStore::new()),
            clock,
            encoder,
            sink.clone(),
        )
        .unwrap();
        (studio, sink)
    }

    fn studio() -> (Studio, Arc<MemorySink>) {
        studio_with(Arc::new(default_encoder(PollPolicy::default())))
    }

    #[tokio::test]
    async fn test_generate_caches_composition() {
        let (studio, _) = studio();
        studio.set_input(GenerateInput::new("hello")).await.unwrap();
        let preview = studio.generate().await.unwrap();

        let artifact = preview.artifact().unwrap();
        assert_eq!(artifact.surface.dimensions(), (128, 128));
        assert_eq!(artifact.preview.dimensions(), (32, 32));
        assert!(!artifact.has_logo);
    }

    #[tokio::test]
    async fn test_generate_empty_text() {
        let (studio, _) = studio();
        studio.set_input(GenerateInput::new("   ")).await.unwrap();
        let err = studio.generate().await.unwrap_err();
        assert!(matches!(err, Error::InputEmpty));
        assert!(matches!(studio.current().await, PreviewState::Empty));
    }

    #[tokio::test]
    async fn test_encoding_failure_disables_export() {
        let (studio, _) = studio();
        studio.set_input(GenerateInput::new("ok")).await.unwrap();
        studio.generate().await.unwrap();

        studio
            .set_input(GenerateInput::new("x".repeat(5000)))
            .await
            .unwrap();
        assert!(matches!(
            studio.generate().await.unwrap_err(),
            Error::EncodingFailure(_)
        ));
        assert!(matches!(studio.current().await, PreviewState::Failed(_)));
        assert!(matches!(
            studio.export_as(ExportFormat::Raster).await.unwrap_err(),
            Error::NoComposition
        ));
    }

    #[tokio::test]
    async fn test_rejects_logo_fraction_out_of_range() {
        let (studio, _) = studio();
        let mut input = GenerateInput::new("x");
        input.logo_fraction = 0.6;
        assert!(studio.set_input(input.clone()).await.is_err());
        input.logo_fraction = 0.0;
        assert!(studio.set_input(input).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let (studio, _) = studio();
        studio
            .set_input(GenerateInput {
                text: "hello".into(),
                dark: HexColor { r: 1, g: 2, b: 3 },
                light: HexColor::WHITE,
                logo_fraction: 0.3,
            })
            .await
            .unwrap();
        studio.generate().await.unwrap();

        studio.clear().await.unwrap();
        assert_eq!(studio.input().await, GenerateInput::default());
        assert!(matches!(studio.current().await, PreviewState::Empty));
        assert!(!studio.has_logo().await);
    }

    #[tokio::test]
    async fn test_bad_logo_is_dropped_with_warning() {
        let (studio, _) = studio();
        studio.set_input(GenerateInput::new("hello")).await.unwrap();

        let err = studio.set_logo(Some(b"nope".to_vec())).await.unwrap_err();
        assert!(matches!(err, Error::AssetDecodeFailure(_)));
        assert!(!studio.has_logo().await);
        let current = studio.current().await;
        assert!(!current.artifact().unwrap().has_logo);
    }

    /// Encoder whose first call is slow, later calls fast
    struct SlowFirst {
        calls: AtomicU64,
        inner: Arc<dyn QrEncoder>,
    }

    #[async_trait]
    impl QrEncoder for SlowFirst {
        async fn encode(&self, request: &EncodeRequest) -> Result<EncodedImage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.encode(request).await
        }
    }

    #[tokio::test]
    async fn test_stale_recompute_does_not_overwrite() {
        let encoder = Arc::new(SlowFirst {
            calls: AtomicU64::new(0),
            inner: Arc::new(default_encoder(PollPolicy::default())),
        });
        let (studio, _) = studio_with(encoder);

        studio.set_input(GenerateInput::new("old")).await.unwrap();
        let slow = {
            let studio = studio.clone();
            tokio::spawn(async move { studio.generate().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        studio.set_input(GenerateInput::new("new")).await.unwrap();
        studio.generate().await.unwrap();
        slow.await.unwrap().unwrap();

        let current = studio.current().await;
        assert_eq!(current.artifact().unwrap().input.text, "new");
    }

    #[tokio::test]
    async fn test_export_records_history_and_quota() {
        let (studio, sink) = studio();
        studio.set_input(GenerateInput::new("Hello World")).await.unwrap();
        studio.generate().await.unwrap();

        let outcome = studio.export_as(ExportFormat::Document).await.unwrap();
        assert_eq!(outcome.filename, "qr-hello-world.pdf");
        assert_eq!(outcome.quota.used, 1);
        assert_eq!(sink.saved()[0].mime, "application/pdf");

        let history = studio.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].format, ExportFormat::Document);
        assert!(history[0].artifact_reference.starts_with("data:image/png;base64,"));
    }

    struct FailingSink;

    #[async_trait]
    impl ArtifactSink for FailingSink {
        async fn save(
            &self,
            _filename: &str,
            _artifact: &crate::services::export::ExportArtifact,
        ) -> Result<String> {
            Err(Error::Io(std::io::Error::other("cancelled")))
        }
    }

    #[tokio::test]
    async fn test_failed_save_still_counts() {
        let studio = Studio::new(
            small_config(),
            Arc::new(MemoryStateStore::new()),
            Arc::new(SystemClock),
            Arc::new(default_encoder(PollPolicy::default())),
            Arc::new(FailingSink),
        )
        .unwrap();
        studio.set_input(GenerateInput::new("hello")).await.unwrap();
        studio.generate().await.unwrap();

        assert!(studio.export_as(ExportFormat::Raster).await.is_err());
        assert_eq!(studio.quota_status().await.unwrap().used, 1);
        assert_eq!(studio.history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_logo_error_wins_over_recompose_failure() {
        let (studio, _) = studio();
        studio
            .set_input(GenerateInput::new("x".repeat(5000)))
            .await
            .unwrap();

        let err = studio.set_logo(Some(b"nope".to_vec())).await.unwrap_err();
        assert!(matches!(err, Error::AssetDecodeFailure(_)));
        assert!(matches!(studio.current().await, PreviewState::Failed(_)));
    }

    /// Memory store whose history reads take a while
    struct SlowHistoryStore {
        inner: MemoryStateStore,
    }

    #[async_trait]
    impl StateStore for SlowHistoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            if key == HISTORY_KEY {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.inner.put(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_clear_history_waits_for_running_export() {
        let studio = Studio::new(
            small_config(),
            Arc::new(SlowHistoryStore {
                inner: MemoryStateStore::new(),
            }),
            Arc::new(SystemClock),
            Arc::new(default_encoder(PollPolicy::default())),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        studio.set_input(GenerateInput::new("old")).await.unwrap();
        studio.generate().await.unwrap();
        studio.export_as(ExportFormat::Raster).await.unwrap();

        let running = {
            let studio = studio.clone();
            tokio::spawn(async move { studio.export_as(ExportFormat::Raster).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        studio.clear_history().await.unwrap();
        running.await.unwrap().unwrap();

        assert!(studio.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_text_empty_is_none() {
        let (studio, _) = studio();
        assert!(studio.export_history_text().await.unwrap().is_none());
    }
}
