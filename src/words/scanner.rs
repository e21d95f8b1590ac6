//! Startup reconciliation scanner
//!
//! After a restart the word index can trail the character stream: hits
//! detected after the last word flush but before the last cursor flush
//! were never persisted. The scanner replays the detector over that gap.

use std::sync::Arc;

use tracing::info;

use crate::store::ChunkStore;

use super::{Dictionary, MAX_WORD_LEN, WordDetector, WordHit, WordsResult};

/// Re-detect words ending after `high_water`, up to `cursor`.
///
/// Reading begins `MAX_WORD_LEN - 1` characters before `high_water` so a
/// word *ending* at or after the mark is seen with full left context.
/// Hits ending at or before `high_water` are already persisted and are
/// dropped; a hit that merely *starts* before the mark may have been lost
/// in the crash, and re-reporting one that was not is harmless because
/// document ids are idempotent.
pub async fn scan_gap(
    store: &ChunkStore,
    dict: Arc<Dictionary>,
    high_water: u64,
    cursor: u64,
    slice_len: u32,
) -> WordsResult<Vec<WordHit>> {
    let scan_start = high_water.saturating_sub(MAX_WORD_LEN as u64 - 1);

    let mut detector = WordDetector::new(dict);
    let mut hits = Vec::new();
    let mut pos = scan_start;

    while pos < cursor {
        let want = slice_len.min((cursor - pos).min(u32::MAX as u64) as u32);
        let slice = store.read_slice(pos, want).await?;
        if slice.is_empty() {
            break;
        }
        for ch in slice.chars() {
            if let Some(hit) = detector.push(ch, pos)
                && hit.end() > high_water
            {
                hits.push(hit);
            }
            pos += 1;
        }
    }

    info!(
        scan_start,
        high_water,
        cursor,
        found = hits.len(),
        "startup word scan complete"
    );
    Ok(hits)
}
