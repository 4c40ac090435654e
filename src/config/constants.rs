// * Configuration Constants
// * Central location for markers, intervals and TTLs used by the pipeline

// * Beacon request marker; the tracking query string starts right after it
pub const DIG_MARKER: &str = " /dig?";

// * End of the tracking query string in an access log line
pub const HTTP_VERSION_MARKER: &str = " HTTP/";

// * Path markers for page classification, most specific first
pub const DETAIL_MARKER: &str = "/movie/";
pub const LIST_MARKER: &str = "/list/";
pub const HTML_SUFFIX: &str = ".html";

// * Resource id recorded for home (and unclassified) pages
pub const HOME_RESOURCE_ID: u64 = 1;

// * Pause after reaching end of the tailed file
pub const EOF_BACKOFF_MS: u64 = 3_000;

// * Liveness probe period against the counter store
pub const KEEPALIVE_INTERVAL_MS: u64 = 3_000;

// * Day-scoped visitor sets expire after one day
pub const HLL_TTL_SECS: u64 = 86_400;

// * Key prefix for the daily visitor HyperLogLog
pub const HLL_KEY_PREFIX: &str = "uv_hpll_";

// * Progress is logged every PROGRESS_LINES_PER_WORKER * workers lines
pub const PROGRESS_LINES_PER_WORKER: u64 = 1_000;

// * Raw line queue holds RAW_QUEUE_FACTOR * workers lines
pub const RAW_QUEUE_FACTOR: usize = 3;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
