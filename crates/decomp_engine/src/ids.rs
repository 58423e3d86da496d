use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use decomp_core::JobId;
use sha2::{Digest, Sha256};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh 24-hex-character job id from the source url, the wall
/// clock and a process-wide counter.
pub fn generate_job_id(source_url: &str) -> JobId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(count.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(24);
    for byte in digest.iter().take(12) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    // Lowercase hex is always a valid id.
    JobId::parse(&hex).unwrap_or_else(|_| unreachable!("hex ids are valid"))
}
