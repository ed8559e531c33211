//! ELM327 Response Framing
//!
//! The adapter answers every command with one or more lines terminated by a
//! carriage return, then prints `>` once it is ready for the next command.
//! The splitter turns an arbitrarily chunked byte stream into those lines.

/// Line delimiter used by the adapter
pub const DELIMITER: u8 = b'\r';

/// Ready marker printed by the adapter when idle
pub const PROMPT: u8 = b'>';

/// One stripped, non-empty reply line from the adapter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    /// Wrap a line, rejecting empty input
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    /// Line bytes as received (spaces kept)
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Line bytes with the separating spaces between hex pairs removed
    pub fn normalized(&self) -> Vec<u8> {
        self.0.iter().copied().filter(|&b| b != b' ').collect()
    }
}

impl std::fmt::Display for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Result of feeding one chunk into the splitter
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Split {
    /// Complete frames, in stream order
    pub frames: Vec<RawFrame>,
    /// Unterminated tail kept for the next chunk
    pub residue: Vec<u8>,
    /// Whether a prompt marker was consumed
    pub prompt_seen: bool,
}

/// Split `residue + chunk` into frames.
///
/// An empty `chunk` means end of stream: a non-empty residue is emitted as the
/// final frame and the returned residue is empty.
pub fn split(residue: &[u8], chunk: &[u8]) -> Split {
    let mut prompt_seen = false;

    if chunk.is_empty() {
        let frames = clean_segment(residue, &mut prompt_seen).into_iter().collect();
        return Split {
            frames,
            residue: Vec::new(),
            prompt_seen,
        };
    }

    let mut buf = Vec::with_capacity(residue.len() + chunk.len());
    buf.extend_from_slice(residue);
    buf.extend_from_slice(chunk);

    let mut frames = Vec::new();
    let mut start = 0;
    while let Some(pos) = buf[start..].iter().position(|&b| b == DELIMITER) {
        if let Some(frame) = clean_segment(&buf[start..start + pos], &mut prompt_seen) {
            frames.push(frame);
        }
        start += pos + 1;
    }

    let mut residue = buf.split_off(start);
    if trim_whitespace(&residue) == [PROMPT] {
        residue.clear();
        prompt_seen = true;
    }

    Split {
        frames,
        residue,
        prompt_seen,
    }
}

/// Strip whitespace and prompt markers from both ends of a segment
fn clean_segment(segment: &[u8], prompt_seen: &mut bool) -> Option<RawFrame> {
    let mut s = trim_whitespace(segment);
    while let Some((&PROMPT, rest)) = s.split_first() {
        *prompt_seen = true;
        s = trim_whitespace(rest);
    }
    while let Some((&PROMPT, rest)) = s.split_last() {
        *prompt_seen = true;
        s = trim_whitespace(rest);
    }
    RawFrame::new(s)
}

fn trim_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Stateful wrapper around [`split`] that owns the residue between chunks
#[derive(Debug, Default)]
pub struct FrameSplitter {
    residue: Vec<u8>,
}

impl FrameSplitter {
    /// Create an empty splitter
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; an empty chunk flushes the residue as a final frame
    pub fn feed(&mut self, chunk: &[u8]) -> (Vec<RawFrame>, bool) {
        let Split {
            frames,
            residue,
            prompt_seen,
        } = split(&self.residue, chunk);
        self.residue = residue;
        (frames, prompt_seen)
    }

    /// End of stream
    pub fn finish(&mut self) -> Option<RawFrame> {
        let (mut frames, _) = self.feed(&[]);
        frames.pop()
    }

    /// Bytes waiting for a delimiter
    pub fn residue(&self) -> &[u8] {
        &self.residue
    }
}
