//! Services module

pub mod compositor;
pub mod encoder;
pub mod export;
pub mod history;
pub mod logo;
pub mod pdf;
pub mod quota;
pub mod scheduler;
pub mod state_store;
pub mod studio;

pub use compositor::{compose, fill_rounded_rect, preview, HexColor, LogoOverlay, LogoPlacement};
pub use encoder::{
    default_encoder, Completion, DefaultEncoder, EcLevel, EncodeRequest, EncodedImage,
    EncoderBackend, OutputMode, PendingEncode, PollPolicy, PollingEncoder, QrCodeBackend,
    QrEncoder,
};
pub use export::{
    encode_png, export_filename, slugify, ArtifactSink, ExportArtifact, ExportFormat,
    ExportStrategy, FsSink, MemorySink, Notice, SavedArtifact,
};
pub use history::{export_text, HistoryEntry, HistoryLog, EXPORT_HEADER};
pub use logo::{data_url, decode_logo, LogoAsset};
pub use pdf::{PageLayout, PdfDocument, Placement};
pub use quota::{
    quota_exceeded, Limit, Plan, PlanDefinition, QuotaState, QuotaStatus, QuotaStore,
    Remaining, StoredQuotaRecord, PLANS,
};
pub use scheduler::PreviewScheduler;
pub use state_store::{
    month_key, Clock, FixedClock, MemoryStateStore, SqliteStateStore, StateStore, SystemClock,
    HISTORY_KEY, QUOTA_KEY,
};
pub use studio::{ComposedArtifact, ExportOutcome, GenerateInput, PreviewState, Studio};
