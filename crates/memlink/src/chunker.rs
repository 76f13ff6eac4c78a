//! Payload chunking for oversized uploads
//!
//! Splits text on line boundaries so every piece stays within a byte limit.
//! Lines longer than the limit are force-split into slices of `limit / 4`
//! characters, which leaves room for multi-byte UTF-8 expansion.
//!
//! Joining the pieces with `\n` restores the input, except at forced
//! mid-line splits: those pieces were never separated by a newline, so a
//! plain `\n` join inserts one that was not there.

use crate::client::types::Message;

/// One size-bounded slice of an oversized payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadChunk<T> {
    pub content: T,
    /// Zero-based position in the upload order
    pub sequence_index: usize,
    pub total_chunks: usize,
}

/// Wrap ordered pieces with their position in the sequence
pub fn into_chunks<T>(pieces: Vec<T>) -> Vec<PayloadChunk<T>> {
    let total_chunks = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(sequence_index, content)| PayloadChunk {
            content,
            sequence_index,
            total_chunks,
        })
        .collect()
}

/// Split `data` into pieces of at most `limit` bytes.
///
/// Returns `data` unchanged as the only piece when it already fits.
pub fn split(data: &str, limit: usize) -> Vec<String> {
    if data.len() <= limit {
        return vec![data.to_string()];
    }

    let slice_chars = (limit / 4).max(1);
    let mut chunks = Vec::new();
    // None and Some("") differ: the latter still owes a line to the output
    let mut buffer: Option<String> = None;

    for line in data.split('\n') {
        if line.len() > limit {
            if let Some(pending) = buffer.take() {
                chunks.push(pending);
            }

            let mut rest = line;
            while rest.len() > limit {
                let cut = rest
                    .char_indices()
                    .nth(slice_chars)
                    .map(|(idx, _)| idx)
                    .unwrap_or(rest.len());
                chunks.push(rest[..cut].to_string());
                rest = &rest[cut..];
            }
            if !rest.is_empty() {
                buffer = Some(rest.to_string());
            }
            continue;
        }

        buffer = match buffer.take() {
            None => Some(line.to_string()),
            Some(mut pending) => {
                if pending.len() + 1 + line.len() > limit {
                    chunks.push(pending);
                    Some(line.to_string())
                } else {
                    pending.push('\n');
                    pending.push_str(line);
                    Some(pending)
                }
            }
        };
    }

    if let Some(pending) = buffer {
        chunks.push(pending);
    }

    chunks
}

/// Split `data` so that every piece measures at most `cap`.
///
/// `measure` gives the size a piece has on the wire, which grows past its
/// byte length once escaped and wrapped in a request body. A piece that
/// measures over `cap` is split again with its limit scaled down by the
/// overshoot. Returns `None` when even a single character does not fit.
pub fn split_to_fit<F>(data: &str, cap: usize, measure: F) -> Option<Vec<String>>
where
    F: Fn(&str) -> usize,
{
    let mut out = Vec::new();
    for piece in split(data, cap) {
        refit(piece, cap, &measure, &mut out)?;
    }
    Some(out)
}

fn refit<F>(piece: String, cap: usize, measure: &F, out: &mut Vec<String>) -> Option<()>
where
    F: Fn(&str) -> usize,
{
    let size = measure(&piece);
    if size <= cap {
        out.push(piece);
        return Some(());
    }

    // Single characters cannot shrink any further
    if piece.chars().nth(1).is_none() {
        return None;
    }

    let len = piece.len();
    let scaled = (len as u128 * cap as u128 / size as u128) as usize;
    let limit = scaled.min(len - 1);
    if limit == 0 {
        return None;
    }

    for sub in split(&piece, limit) {
        refit(sub, cap, measure, out)?;
    }
    Some(())
}

/// Split each message's content independently.
///
/// Pieces of a message that needed splitting are tagged `part_i_of_k`.
pub fn split_messages(messages: &[Message], limit: usize) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        tag_parts(message, split(&message.content, limit), &mut out);
    }
    out
}

/// Like [`split_messages`], but every resulting message measures at most
/// `cap` according to `measure`, tag included.
pub fn split_messages_to_fit<F>(
    messages: &[Message],
    cap: usize,
    measure: F,
) -> Option<Vec<Message>>
where
    F: Fn(&Message) -> usize,
{
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        let pieces = split_to_fit(&message.content, cap, |content| {
            measure(&Message {
                role: message.role.clone(),
                content: content.to_string(),
                chunk_info: Some(WIDEST_PART_TAG.to_string()),
            })
        })?;
        tag_parts(message, pieces, &mut out);
    }
    Some(out)
}

// Stands in for the real tag while sizing, before the part count is known
const WIDEST_PART_TAG: &str = "part_99999_of_99999";

fn tag_parts(message: &Message, pieces: Vec<String>, out: &mut Vec<Message>) {
    let total = pieces.len();
    for (i, content) in pieces.into_iter().enumerate() {
        let mut piece = message.clone();
        piece.content = content;
        if total > 1 {
            piece.chunk_info = Some(format!("part_{}_of_{}", i + 1, total));
        }
        out.push(piece);
    }
}
