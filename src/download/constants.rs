//! Constants for the download module (timeouts, retry budget, file naming).

use std::time::Duration;

/// Default number of attempts per logical request or transfer.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

/// Default ceiling on request setup and header receipt (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default ceiling on the gap between two body chunks (2 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(120_000);

/// TCP connect timeout applied to the underlying client.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// First backoff step in milliseconds.
pub const BACKOFF_BASE_MS: u64 = 700;

/// Backoff ceiling in milliseconds.
pub const BACKOFF_CAP_MS: u64 = 30_000;

/// Suffix appended to the final path while bytes are still arriving.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Remaining-bytes window in which displayed progress snaps to the expected total.
pub const PROGRESS_CLAMP_TOLERANCE: u64 = 1024;

/// Minimum interval between two progress events for one transfer.
pub const PROGRESS_EMIT_INTERVAL: Duration = Duration::from_millis(200);
