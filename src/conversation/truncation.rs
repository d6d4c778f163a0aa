//! Non-destructive sliding-window truncation

use crate::conversation::message::{Message, TruncationResult};
use chrono::{Duration, Utc};
use tracing::debug;

/// Indices of messages that are neither hidden nor truncation markers
pub fn visible_indices(messages: &[Message]) -> Vec<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, message)| message.is_visible())
        .map(|(index, _)| index)
        .collect()
}

/// How many visible messages to hide for a given fraction
///
/// The first visible message never counts, and the result is rounded
/// down to the nearest even number so conversations keep their
/// user/assistant alternation.
pub fn removal_count(visible_len: usize, fraction: f64) -> usize {
    if visible_len == 0 {
        return 0;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let raw = ((visible_len - 1) as f64 * fraction).floor() as usize;
    raw - raw % 2
}

/// Hide the oldest removable messages and insert a marker in their place
///
/// Hidden messages stay in the list with `truncation_parent` set, so the
/// operation is reversible and re-running it on its own output hides
/// nothing twice.
pub fn truncate(messages: Vec<Message>, fraction: f64, truncation_id: &str) -> TruncationResult {
    let visible = visible_indices(&messages);
    let to_remove = removal_count(visible.len(), fraction);
    if to_remove == 0 {
        return TruncationResult {
            messages,
            truncation_id: truncation_id.to_string(),
            messages_removed: 0,
        };
    }

    let mut messages = messages;
    for &index in &visible[1..=to_remove] {
        messages[index].truncation_parent = Some(truncation_id.to_string());
    }

    let mut marker = Message::assistant(format!(
        "[{} earlier messages hidden to stay within the context window]",
        to_remove
    ));
    marker.is_truncation_marker = true;

    match visible.get(to_remove + 1).copied() {
        Some(next_surviving) => {
            marker.ts = messages[next_surviving].ts - Duration::milliseconds(1);
            messages.insert(next_surviving, marker);
        }
        None => {
            marker.ts = messages
                .last()
                .map(|message| message.ts + Duration::milliseconds(1))
                .unwrap_or_else(Utc::now);
            messages.push(marker);
        }
    }

    debug!(
        truncation_id,
        hidden = to_remove,
        "Hid oldest messages behind truncation marker"
    );
    TruncationResult {
        messages,
        truncation_id: truncation_id.to_string(),
        messages_removed: to_remove,
    }
}
