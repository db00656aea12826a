use strand_contract::RuntimeEvent;
use tracing::warn;

/// Incremental decoder for line-delimited JSON event streams.
///
/// Network reads split the body at arbitrary byte boundaries; the decoder
/// buffers partial lines across [`feed`](LineDecoder::feed) calls and
/// only parses complete lines. Malformed lines are logged and skipped so
/// one bad event does not kill the stream.
#[derive(Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of body bytes, returning the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RuntimeEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = Self::parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the trailing unterminated line at end of stream, if any.
    pub fn finish(&mut self) -> Option<RuntimeEvent> {
        let line = std::mem::take(&mut self.buffer);
        Self::parse_line(&line)
    }

    /// Whether a partial line is still buffered.
    pub fn has_partial(&self) -> bool {
        !self.buffer.iter().all(|b| b.is_ascii_whitespace())
    }

    fn parse_line(line: &[u8]) -> Option<RuntimeEvent> {
        let trimmed = trim_ascii(line);
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_slice(trimmed) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!(
                    error = %err,
                    line = %String::from_utf8_lossy(trimmed),
                    "skipping malformed event line"
                );
                None
            }
        }
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(event: &RuntimeEvent) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(event).unwrap();
        bytes.push(b'\n');
        bytes
    }

    #[test]
    fn decodes_complete_lines() {
        let mut decoder = LineDecoder::new();
        let mut chunk = line(&RuntimeEvent::text_start("m1"));
        chunk.extend(line(&RuntimeEvent::text_content("m1", "hi")));
        let events = decoder.feed(&chunk);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], RuntimeEvent::text_content("m1", "hi"));
    }

    #[test]
    fn reassembles_event_split_across_reads() {
        let bytes = line(&RuntimeEvent::text_content("m1", "hello world"));
        let mut decoder = LineDecoder::new();

        let first = decoder.feed(&bytes[..10]);
        assert!(first.is_empty());
        let second = decoder.feed(&bytes[10..25]);
        assert!(second.is_empty());
        let third = decoder.feed(&bytes[25..]);
        assert_eq!(third, vec![RuntimeEvent::text_content("m1", "hello world")]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn skips_malformed_lines() {
        let mut decoder = LineDecoder::new();
        let mut chunk = b"{not json}\n".to_vec();
        chunk.extend(line(&RuntimeEvent::text_end("m1")));
        let events = decoder.feed(&chunk);
        assert_eq!(events, vec![RuntimeEvent::text_end("m1")]);
    }

    #[test]
    fn ignores_blank_lines() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.feed(b"\n\r\n  \n").is_empty());
        assert!(!decoder.has_partial());
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = LineDecoder::new();
        let bytes = serde_json::to_vec(&RuntimeEvent::text_end("m1")).unwrap();
        assert!(decoder.feed(&bytes).is_empty());
        assert!(decoder.has_partial());
        assert_eq!(decoder.finish(), Some(RuntimeEvent::text_end("m1")));
        assert_eq!(decoder.finish(), None);
    }
}
