//! QR encoder boundary
//!
//! Callers see one asynchronous contract, [`QrEncoder::encode`]. Backends may
//! complete immediately or hand back a pending job; [`PollingEncoder`] owns
//! the bounded retry poll for the latter and is the only place that knows
//! about the two completion styles. Backends start on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::error::{Error, Result};
use crate::services::compositor::HexColor;

/// Modules of light margin around the symbol
pub const QUIET_ZONE_MODULES: u32 = 4;

// ============================================================================
// Request / Result Types
// ============================================================================

/// Error-correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EcLevel {
    L,
    M,
    Q,
    #[default]
    H,
}

impl From<EcLevel> for qrcode::EcLevel {
    fn from(level: EcLevel) -> Self {
        match level {
            EcLevel::L => qrcode::EcLevel::L,
            EcLevel::M => qrcode::EcLevel::M,
            EcLevel::Q => qrcode::EcLevel::Q,
            EcLevel::H => qrcode::EcLevel::H,
        }
    }
}

/// Output shape requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Raster,
    Vector,
}

/// One encoding job
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub text: String,
    /// Edge length in pixels
    pub size: u32,
    pub dark: HexColor,
    pub light: HexColor,
    pub ec_level: EcLevel,
    pub mode: OutputMode,
}

/// Encoder output
#[derive(Debug, Clone)]
pub enum EncodedImage {
    Raster(RgbaImage),
    /// SVG markup
    Vector(String),
}

impl EncodedImage {
    pub fn into_raster(self) -> Result<RgbaImage> {
        match self {
            EncodedImage::Raster(img) => Ok(img),
            EncodedImage::Vector(_) => Err(Error::encoding("expected raster output, got vector")),
        }
    }

    pub fn into_vector(self) -> Result<String> {
        match self {
            EncodedImage::Vector(markup) => Ok(markup),
            EncodedImage::Raster(_) => Err(Error::encoding("expected vector output, got raster")),
        }
    }
}

// ============================================================================
// Encoder Contract
// ============================================================================

/// Asynchronous QR encoder
#[async_trait]
pub trait QrEncoder: Send + Sync {
    async fn encode(&self, request: &EncodeRequest) -> Result<EncodedImage>;
}

/// A job that did not finish when it was started
pub trait PendingEncode: Send {
    /// Check for a result; `None` while still running
    fn poll_ready(&mut self) -> Option<Result<EncodedImage>>;
}

/// How a backend signalled completion
pub enum Completion {
    Ready(EncodedImage),
    Pending(Box<dyn PendingEncode>),
}

/// Raw encoder with either completion style
pub trait EncoderBackend: Send + Sync {
    fn begin(&self, request: &EncodeRequest) -> Result<Completion>;
}

/// Bounded poll for late completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the first check
    pub initial_delay: Duration,
    /// Delay between subsequent checks
    pub interval: Duration,
    /// Checks after the first one before giving up
    pub max_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(40),
            interval: Duration::from_millis(80),
            max_retries: 12,
        }
    }
}

impl PollPolicy {
    /// Worst-case wait before an encode is declared failed
    pub fn timeout(&self) -> Duration {
        self.initial_delay + self.interval * self.max_retries
    }
}

/// Adapts any backend to the single async contract
pub struct PollingEncoder<B> {
    backend: Arc<B>,
    policy: PollPolicy,
}

impl<B: EncoderBackend + 'static> PollingEncoder<B> {
    pub fn new(backend: B, policy: PollPolicy) -> Self {
        Self {
            backend: Arc::new(backend),
            policy,
        }
    }

    /// Run `begin` off the async executor; rasterizing is CPU-bound
    async fn start(&self, request: &EncodeRequest) -> Result<Completion> {
        let backend = Arc::clone(&self.backend);
        let request = request.clone();
        tokio::task::spawn_blocking(move || backend.begin(&request)).await?
    }

    async fn wait(&self, mut pending: Box<dyn PendingEncode>) -> Result<EncodedImage> {
        tokio::time::sleep(self.policy.initial_delay).await;
        if let Some(result) = pending.poll_ready() {
            return result;
        }

        for attempt in 1..=self.policy.max_retries {
            tokio::time::sleep(self.policy.interval).await;
            if let Some(result) = pending.poll_ready() {
                log::debug!("[encoder] Completed after {} retries", attempt);
                return result;
            }
        }

        log::warn!(
            "[encoder] No result after {:?}, giving up",
            self.policy.timeout()
        );
        Err(Error::encoding("encoder did not complete before timeout"))
    }
}

#[async_trait]
impl<B: EncoderBackend + 'static> QrEncoder for PollingEncoder<B> {
    async fn encode(&self, request: &EncodeRequest) -> Result<EncodedImage> {
        match self.start(request).await? {
            Completion::Ready(image) => Ok(image),
            Completion::Pending(pending) => self.wait(pending).await,
        }
    }
}

// ============================================================================
// qrcode Backend
// ============================================================================

/// Encoder backed by the `qrcode` crate; always completes immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct QrCodeBackend;

impl QrCodeBackend {
    fn symbol(request: &EncodeRequest) -> Result<QrCode> {
        QrCode::with_error_correction_level(request.text.as_bytes(), request.ec_level.into())
            .map_err(|e| Error::encoding(e.to_string()))
    }

    /// Paint the module matrix (plus quiet zone) onto a `size` x `size` surface
    fn rasterize(code: &QrCode, request: &EncodeRequest) -> RgbaImage {
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let total = modules + QUIET_ZONE_MODULES * 2;
        let size = request.size;
        let dark = request.dark.to_rgba();
        let light = request.light.to_rgba();

        let module_at = |px: u32| (px as u64 * total as u64 / size as u64) as u32;

        RgbaImage::from_fn(size, size, |x, y| {
            let (mx, my) = (module_at(x), module_at(y));
            let inside = (QUIET_ZONE_MODULES..QUIET_ZONE_MODULES + modules).contains(&mx)
                && (QUIET_ZONE_MODULES..QUIET_ZONE_MODULES + modules).contains(&my);
            if !inside {
                return light;
            }
            let index = ((my - QUIET_ZONE_MODULES) * modules + (mx - QUIET_ZONE_MODULES)) as usize;
            match colors[index] {
                qrcode::Color::Dark => dark,
                qrcode::Color::Light => light,
            }
        })
    }

    fn vectorize(code: &QrCode, request: &EncodeRequest) -> String {
        let dark = request.dark.to_string();
        let light = request.light.to_string();
        code.render::<svg::Color>()
            .min_dimensions(request.size, request.size)
            .quiet_zone(true)
            .dark_color(svg::Color(&dark))
            .light_color(svg::Color(&light))
            .build()
    }
}

impl EncoderBackend for QrCodeBackend {
    fn begin(&self, request: &EncodeRequest) -> Result<Completion> {
        if request.size == 0 {
            return Err(Error::validation("encode size must be positive"));
        }

        let code = Self::symbol(request)?;
        log::debug!(
            "[encoder] Encoded {} bytes as {}x{} modules",
            request.text.len(),
            code.width(),
            code.width()
        );

        let image = match request.mode {
            OutputMode::Raster => EncodedImage::Raster(Self::rasterize(&code, request)),
            OutputMode::Vector => EncodedImage::Vector(Self::vectorize(&code, request)),
        };
        Ok(Completion::Ready(image))
    }
}

/// The default encoder used by the studio
pub type DefaultEncoder = PollingEncoder<QrCodeBackend>;

/// Build the default encoder with the given poll policy
pub fn default_encoder(policy: PollPolicy) -> DefaultEncoder {
    PollingEncoder::new(QrCodeBackend, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    fn request(text: &str, mode: OutputMode) -> EncodeRequest {
        EncodeRequest {
            text: text.to_string(),
            size: 256,
            dark: HexColor::BLACK,
            light: HexColor::WHITE,
            ec_level: EcLevel::H,
            mode,
        }
    }

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            initial_delay: Duration::from_millis(1),
            interval: Duration::from_millis(1),
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_raster_has_requested_size_and_quiet_zone() {
        let encoder = default_encoder(PollPolicy::default());
        let img = encoder
            .encode(&request("hello", OutputMode::Raster))
            .await
            .unwrap()
            .into_raster()
            .unwrap();

        assert_eq!(img.dimensions(), (256, 256));
        assert_eq!(*img.get_pixel(0, 0), HexColor::WHITE.to_rgba());
        assert!(img.pixels().any(|p| *p == HexColor::BLACK.to_rgba()));
    }

    #[tokio::test]
    async fn test_vector_is_svg_without_embedded_raster() {
        let encoder = default_encoder(PollPolicy::default());
        let markup = encoder
            .encode(&request("https://example.com", OutputMode::Vector))
            .await
            .unwrap()
            .into_vector()
            .unwrap();

        assert!(markup.contains("<svg"));
        assert!(markup.contains("#000000"));
        assert!(!markup.contains("<image"));
    }

    #[tokio::test]
    async fn test_rejects_text_too_dense() {
        let encoder = default_encoder(PollPolicy::default());
        let text = "x".repeat(5000);
        let err = encoder
            .encode(&request(&text, OutputMode::Raster))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncodingFailure(_)));
    }

    struct LateBackend {
        ready_after: u32,
    }

    struct LateJob {
        polls: Arc<AtomicU32>,
        ready_after: u32,
    }

    impl PendingEncode for LateJob {
        fn poll_ready(&mut self) -> Option<Result<EncodedImage>> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            (n >= self.ready_after).then(|| Ok(EncodedImage::Vector("<svg/>".into())))
        }
    }

    impl EncoderBackend for LateBackend {
        fn begin(&self, _request: &EncodeRequest) -> Result<Completion> {
            Ok(Completion::Pending(Box::new(LateJob {
                polls: Arc::new(AtomicU32::new(0)),
                ready_after: self.ready_after,
            })))
        }
    }

    #[tokio::test]
    async fn test_pending_completion_is_polled() {
        let encoder = PollingEncoder::new(LateBackend { ready_after: 3 }, fast_policy());
        let out = encoder
            .encode(&request("hi", OutputMode::Vector))
            .await
            .unwrap();
        assert_eq!(out.into_vector().unwrap(), "<svg/>");
    }

    #[tokio::test]
    async fn test_pending_completion_times_out() {
        // One initial check plus three retries is not enough
        let encoder = PollingEncoder::new(LateBackend { ready_after: 5 }, fast_policy());
        let err = encoder
            .encode(&request("hi", OutputMode::Vector))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EncodingFailure(_)));
    }

    /// Records which thread `begin` ran on
    struct ThreadRecorder {
        seen: Arc<Mutex<Option<ThreadId>>>,
    }

    impl EncoderBackend for ThreadRecorder {
        fn begin(&self, request: &EncodeRequest) -> Result<Completion> {
            *self.seen.lock().unwrap() = Some(thread::current().id());
            QrCodeBackend.begin(request)
        }
    }

    #[tokio::test]
    async fn test_begin_runs_off_the_runtime_thread() {
        let seen = Arc::new(Mutex::new(None));
        let encoder = PollingEncoder::new(
            ThreadRecorder {
                seen: Arc::clone(&seen),
            },
            PollPolicy::default(),
        );
        let img = encoder
            .encode(&request("hello", OutputMode::Raster))
            .await
            .unwrap()
            .into_raster()
            .unwrap();

        assert_eq!(img.dimensions(), (256, 256));
        let ran_on = seen.lock().unwrap().expect("begin was called");
        assert_ne!(ran_on, thread::current().id());
    }

    #[test]
    fn test_default_poll_policy_timeout() {
        assert_eq!(PollPolicy::default().timeout(), Duration::from_millis(1000));
    }
}
