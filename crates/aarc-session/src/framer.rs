//! Byte-stream framing for the AARC command channel.
//!
//! Replies arrive as CR- and/or LF-terminated text, split across TCP reads
//! at arbitrary points. [`Framer`] accumulates chunks and yields one
//! [`Frame`] per complete, trimmed, non-empty line.
//!
//! Call-state events (`$RINGING_1` and friends) are sometimes sent without
//! a terminator. After line extraction the unterminated remainder is scanned
//! for those markers, and each occurrence is reported once as a
//! [`Frame::Marker`] without being removed from the buffer. When the
//! terminator eventually arrives the same text is framed again as an
//! ordinary [`Frame::Line`], so consumers must treat call events as
//! idempotent.
//!
//! # Example
//!
//! ```
//! use aarc_session::framer::{Frame, Framer};
//!
//! let mut framer = Framer::new();
//! assert!(framer.push(b"OK\r").eq([Frame::Line("OK".into())]));
//! assert!(framer.push(b"\n$RINGING_1").eq([Frame::Marker("$RINGING_1")]));
//! assert!(framer.push(b"\r\n").eq([Frame::Line("$RINGING_1".into())]));
//! ```

use bytes::{Buf, BytesMut};

/// Unsolicited call-state markers that may arrive unterminated.
pub const CALL_MARKERS: [&str; 4] = ["$RINGING_1", "$CALLING_1", "$ESTABLISHED_1", "$RELEASED_1"];

/// One unit of framed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, trimmed of surrounding whitespace.
    Line(String),
    /// A call marker found in not-yet-terminated input.
    Marker(&'static str),
}

impl Frame {
    /// The message text, whichever way it was framed.
    pub fn text(&self) -> &str {
        match self {
            Frame::Line(line) => line,
            Frame::Marker(marker) => marker,
        }
    }
}

/// Incremental line framer with early call-marker detection.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
    /// Offset into `buf` below which markers have already been reported.
    marker_scan_pos: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and iterate over the frames it completes.
    ///
    /// The iterator is lazy. Frames not consumed before it is dropped stay
    /// buffered and are produced by the next call to `push` or
    /// [`next_frame`](Framer::next_frame).
    pub fn push(&mut self, chunk: &[u8]) -> Frames<'_> {
        if !chunk.is_empty() {
            self.buf.extend_from_slice(chunk);
        }
        Frames { framer: self }
    }

    /// Produce the next frame from buffered input, if any.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\r' || b == b'\n') {
            let segment = self.buf.split_to(pos);
            self.buf.advance(1);
            self.marker_scan_pos = self.marker_scan_pos.saturating_sub(pos + 1);

            let text = String::from_utf8_lossy(&segment);
            let line = text.trim();
            if !line.is_empty() {
                tracing::trace!(line = %line.escape_debug(), "Framed line");
                return Some(Frame::Line(line.to_string()));
            }
        }

        self.next_marker()
    }

    /// Bytes held back waiting for a terminator.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Drop all buffered input.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.marker_scan_pos = 0;
    }

    fn next_marker(&mut self) -> Option<Frame> {
        let tail = self.buf.get(self.marker_scan_pos..)?;
        let (offset, marker) = CALL_MARKERS
            .iter()
            .filter_map(|m| find(tail, m.as_bytes()).map(|at| (at, *m)))
            .min_by_key(|(at, _)| *at)?;

        self.marker_scan_pos += offset + marker.len();
        tracing::debug!(marker, "Unterminated call marker");
        Some(Frame::Marker(marker))
    }
}

/// Iterator returned by [`Framer::push`].
#[derive(Debug)]
pub struct Frames<'a> {
    framer: &'a mut Framer,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.framer.next_frame()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(frames: impl IntoIterator<Item = Frame>) -> Vec<String> {
        frames
            .into_iter()
            .filter_map(|f| match f {
                Frame::Line(l) => Some(l),
                Frame::Marker(_) => None,
            })
            .collect()
    }

    #[test]
    fn splits_on_cr_lf_and_crlf() {
        let mut framer = Framer::new();
        let frames: Vec<_> = framer.push(b"OK\r\n#COD1=7\rERROR51\n").collect();
        assert_eq!(
            frames,
            vec![
                Frame::Line("OK".into()),
                Frame::Line("#COD1=7".into()),
                Frame::Line("ERROR51".into()),
            ]
        );
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn keeps_partial_tail() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"#NET=").count(), 0);
        assert_eq!(framer.pending(), b"#NET=");
        assert_eq!(
            framer.push(b"5\r\n").collect::<Vec<_>>(),
            vec![Frame::Line("#NET=5".into())]
        );
    }

    #[test]
    fn trims_and_skips_empty() {
        let mut framer = Framer::new();
        let frames: Vec<_> = framer.push(b"\r\n\r\n  OK  \r\n \t \r\n").collect();
        assert_eq!(frames, vec![Frame::Line("OK".into())]);
    }

    #[test]
    fn empty_chunk_is_ignored() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"").count(), 0);
        assert!(framer.pending().is_empty());
    }

    #[test]
    fn any_chunking_yields_same_lines() {
        let stream: &[u8] =
            b"SCOOP 5 IP\r\nOK\r\n#COD1=7\r\n#LOC1=Studio A\r\nCOD1:S=11\nALA:D1=0,D2=0,D3=1\r\nOK\r\n";
        let mut whole = Framer::new();
        let expected = lines(whole.push(stream).collect::<Vec<_>>());
        assert_eq!(expected.len(), 7);

        for split in 1..stream.len() {
            let mut framer = Framer::new();
            let mut got: Vec<Frame> = framer.push(&stream[..split]).collect();
            got.extend(framer.push(&stream[split..]));
            assert_eq!(lines(got), expected, "split at {split}");
        }

        let mut framer = Framer::new();
        let mut got = Vec::new();
        for byte in stream {
            got.extend(framer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(lines(got), expected, "byte at a time");
    }

    #[test]
    fn unterminated_marker_is_reported_once_then_framed() {
        let mut framer = Framer::new();
        assert_eq!(
            framer.push(b"$ESTABLISHED_1").collect::<Vec<_>>(),
            vec![Frame::Marker("$ESTABLISHED_1")]
        );
        // More unterminated bytes do not re-report the same occurrence.
        assert_eq!(framer.push(b" ").count(), 0);
        assert_eq!(framer.pending(), b"$ESTABLISHED_1 ");
        assert_eq!(
            framer.push(b"\r\n").collect::<Vec<_>>(),
            vec![Frame::Line("$ESTABLISHED_1".into())]
        );
    }

    #[test]
    fn marker_split_across_chunks() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"$RING").count(), 0);
        assert_eq!(
            framer.push(b"ING_1").collect::<Vec<_>>(),
            vec![Frame::Marker("$RINGING_1")]
        );
    }

    #[test]
    fn markers_after_a_line_in_one_chunk() {
        let mut framer = Framer::new();
        let frames: Vec<_> = framer.push(b"OK\r\n$CALLING_1$RELEASED_1").collect();
        assert_eq!(
            frames,
            vec![
                Frame::Line("OK".into()),
                Frame::Marker("$CALLING_1"),
                Frame::Marker("$RELEASED_1"),
            ]
        );
    }

    #[test]
    fn second_occurrence_is_reported_after_first_is_framed() {
        let mut framer = Framer::new();
        assert_eq!(framer.push(b"$RINGING_1").count(), 1);
        let frames: Vec<_> = framer.push(b"\r\n$RINGING_1").collect();
        assert_eq!(
            frames,
            vec![
                Frame::Line("$RINGING_1".into()),
                Frame::Marker("$RINGING_1"),
            ]
        );
    }

    #[test]
    fn dropped_iterator_resumes() {
        let mut framer = Framer::new();
        let first = framer.push(b"A\r\nB\r\nC\r\n").next();
        assert_eq!(first, Some(Frame::Line("A".into())));
        assert_eq!(framer.next_frame(), Some(Frame::Line("B".into())));
        assert_eq!(
            framer.push(b"").collect::<Vec<_>>(),
            vec![Frame::Line("C".into())]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut framer = Framer::new();
        let _ = framer.push(b"$RINGING_1 partial").count();
        framer.reset();
        assert!(framer.pending().is_empty());
        assert_eq!(framer.push(b"$RINGING_1").count(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut framer = Framer::new();
        let frames: Vec<_> = framer.push(b"#LOC1=\xffx\r\nOK\r\n").collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], Frame::Line("OK".into()));
    }
}
