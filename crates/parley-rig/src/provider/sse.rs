//! Incremental parser for `text/event-stream` bodies.
//!
//! Only `data:` fields are kept. Multi-line data fields of one event are joined
//! with `\n`; comments and other fields are skipped.

/// Accumulates raw body chunks and yields complete event payloads.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    line: Vec<u8>,
    data: Vec<String>,
}

impl SseParser {
    /// Feeds a body chunk and returns every payload completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, String> {
        let mut events = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.consume_line(&line, &mut events)?;
            } else {
                self.line.push(byte);
            }
        }
        Ok(events)
    }

    /// Flushes a trailing line and event once the body has ended.
    pub(crate) fn finish(mut self) -> Result<Vec<String>, String> {
        let mut events = Vec::new();
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.consume_line(&line, &mut events)?;
        }
        self.dispatch(&mut events);
        Ok(events)
    }

    fn consume_line(&mut self, line: &[u8], events: &mut Vec<String>) -> Result<(), String> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if line.is_empty() {
            self.dispatch(events);
            return Ok(());
        }

        let Some(value) = line.strip_prefix(b"data:") else {
            return Ok(());
        };
        let value = value.strip_prefix(b" ").unwrap_or(value);
        let value = std::str::from_utf8(value)
            .map_err(|error| format!("invalid UTF-8 in event data: {error}"))?;
        self.data.push(value.to_owned());

        Ok(())
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_split_across_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: {\"a\":").unwrap().is_empty());
        assert!(parser.push(b"1}\n").unwrap().is_empty());
        let events = parser.push(b"\n").unwrap();
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn skips_comments_and_handles_crlf() {
        let mut parser = SseParser::default();
        let events = parser
            .push(b": keep-alive\r\n\r\ndata: one\r\n\r\ndata: [DONE]\r\n\r\n")
            .unwrap();
        assert_eq!(events, vec!["one".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: first\ndata: second").unwrap().is_empty());
        let events = parser.finish().unwrap();
        assert_eq!(events, vec!["first\nsecond".to_string()]);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"data: \xff\xfe\n").is_err());
    }
}
