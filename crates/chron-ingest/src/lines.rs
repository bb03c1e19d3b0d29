//! Incremental framing for the push feed.
//!
//! The feed is newline-delimited. Each payload line may carry an SSE
//! `data:` prefix; comment lines (`:`), other SSE fields and blank
//! keep-alives carry no payload. A line split across network chunks is
//! held until its terminator arrives.
//!
//! Every `data:` line is a complete payload on its own: the feed sends one
//! JSON document per line, so consecutive `data:` lines of one SSE event are
//! not joined.
//!
//! A line longer than the configured limit is discarded up to its
//! terminator and logged as malformed.

use chron_core::error::ErrorCode;

/// SSE field names that never carry a payload.
const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Default cap on a single line.
pub const DEFAULT_MAX_LINE: usize = 16 * 1024 * 1024;

/// Accumulates raw bytes and yields complete payload lines.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    limit: usize,
    /// Inside an oversized line; skip until the next newline.
    discarding: bool,
    dropped: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LineDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_LINE)
    }

    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            discarding: false,
            dropped: 0,
        }
    }

    /// Feed one network chunk; returns every payload line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buf.len() + line.len() > self.limit {
                self.drop_line();
                continue;
            }
            self.buf.extend_from_slice(line);
            let raw = std::mem::take(&mut self.buf);
            out.extend(frame(&raw));
        }

        if !rest.is_empty() && !self.discarding {
            if self.buf.len() + rest.len() > self.limit {
                self.drop_line();
                self.discarding = true;
            } else {
                self.buf.extend_from_slice(rest);
            }
        }
        out
    }

    /// Flush an unterminated trailing line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.discarding = false;
        let rest = std::mem::take(&mut self.buf);
        frame(&rest)
    }

    /// Bytes held waiting for a terminator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Lines discarded for exceeding the limit.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    fn drop_line(&mut self) {
        self.buf.clear();
        self.dropped += 1;
        tracing::warn!(
            code = %ErrorCode::MalformedPayload,
            limit = self.limit,
            "discarding oversized stream line"
        );
    }
}

fn frame(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if IGNORED_FIELDS.iter().any(|field| line.starts_with(field)) {
        return None;
    }
    let body = line.strip_prefix("data:").map_or(line, str::trim_start);
    if body.is_empty() {
        return None;
    }
    Some(body.to_string())
}
