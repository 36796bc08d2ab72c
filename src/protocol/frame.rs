use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::trace;

use crate::protocol::error::ProtocolError;
use crate::protocol::{
    Action, END_MESSAGE_MARKER, LEN_PREFIX_SIZE, MAX_METADATA_SIZE, MESSAGE_DELIMITER,
};
use crate::utils::buffer::ChunkBuffer;

/// Decompressed content of one metadata frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_name: String,
    pub file_size: u64,
}

/// Result of a metadata decode attempt against the current buffer.
///
/// `Incomplete` consumes nothing: the caller appends more socket bytes to
/// the same buffer and retries.
#[derive(Debug)]
pub enum DecodeOutcome {
    Complete(FileMetadata),
    Incomplete,
}

/// Pop the one-byte action selector off the front of the buffer.
pub fn decode_action(buf: &mut ChunkBuffer) -> Result<Action, ProtocolError> {
    let Some(&byte) = buf.filled().first() else {
        return Err(ProtocolError::Truncated);
    };
    let action = Action::from_byte(byte)?;
    buf.consume(1);
    Ok(action)
}

/// Try to decode one metadata frame from the front of the buffer.
///
/// On success the frame's bytes are consumed and any trailing payload
/// bytes stay in the buffer, compacted to the front.
pub fn decode_metadata(buf: &mut ChunkBuffer) -> Result<DecodeOutcome, ProtocolError> {
    let filled = buf.filled();
    if filled.len() < LEN_PREFIX_SIZE {
        return Ok(DecodeOutcome::Incomplete);
    }

    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    prefix.copy_from_slice(&filled[..LEN_PREFIX_SIZE]);
    let frame_len = u64::from_be_bytes(prefix) as usize;
    if frame_len > MAX_METADATA_SIZE {
        return Err(ProtocolError::FrameTooLarge(frame_len));
    }

    if filled.len() < LEN_PREFIX_SIZE + frame_len {
        trace!(
            "metadata frame incomplete: have {} of {} bytes",
            filled.len() - LEN_PREFIX_SIZE,
            frame_len
        );
        return Ok(DecodeOutcome::Incomplete);
    }

    let compressed = &filled[LEN_PREFIX_SIZE..LEN_PREFIX_SIZE + frame_len];
    let text = decompress_text(compressed)?;
    if !text.contains(END_MESSAGE_MARKER) {
        // Not actionable yet. Leave every byte in place for the retry.
        return Ok(DecodeOutcome::Incomplete);
    }

    let metadata = parse_metadata_text(&text)?;
    buf.consume(LEN_PREFIX_SIZE + frame_len);
    Ok(DecodeOutcome::Complete(metadata))
}

/// Build the wire form of one metadata frame: an 8-byte big-endian length
/// prefix followed by the compressed `name|size|END` text.
pub fn encode_metadata(file_name: &str, file_size: u64) -> Result<Vec<u8>, ProtocolError> {
    if file_name.contains(MESSAGE_DELIMITER) {
        // The text format has no escaping, so such a name cannot survive
        // the round trip. Refuse it instead of corrupting the frame.
        return Err(ProtocolError::MalformedMetadata(format!(
            "file name {:?} contains the metadata delimiter",
            file_name
        )));
    }

    let text = format!(
        "{}{}{}{}",
        file_name, MESSAGE_DELIMITER, file_size, END_MESSAGE_MARKER
    );
    let compressed = compress_text(&text)?;

    let mut frame = Vec::with_capacity(LEN_PREFIX_SIZE + compressed.len());
    frame.extend_from_slice(&(compressed.len() as u64).to_be_bytes());
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

fn parse_metadata_text(text: &str) -> Result<FileMetadata, ProtocolError> {
    let end = text
        .find(END_MESSAGE_MARKER)
        .ok_or(ProtocolError::MissingEndMarker)?;
    let body = &text[..end];

    let mut parts = body.split(MESSAGE_DELIMITER);
    let (Some(name), Some(size), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ProtocolError::MalformedMetadata(format!(
            "expected name{}size, got {:?}",
            MESSAGE_DELIMITER, body
        )));
    };
    if name.is_empty() {
        return Err(ProtocolError::MalformedMetadata("empty file name".into()));
    }
    let file_size: u64 = size.parse().map_err(|_| {
        ProtocolError::MalformedMetadata(format!("unparseable file size {:?}", size))
    })?;

    Ok(FileMetadata {
        file_name: name.to_string(),
        file_size,
    })
}

fn compress_text(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .and_then(|_| encoder.finish())
        .map_err(|e| ProtocolError::MalformedMetadata(format!("compression failed: {}", e)))
}

fn decompress_text(compressed: &[u8]) -> Result<String, ProtocolError> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| ProtocolError::MalformedMetadata(format!("decompression failed: {}", e)))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(data: &[u8]) -> ChunkBuffer {
        let mut buf = ChunkBuffer::new(64 * 1024);
        buf.spare()[..data.len()].copy_from_slice(data);
        buf.advance(data.len());
        buf
    }

    #[test]
    fn metadata_round_trip() {
        let frame = encode_metadata("report.pdf", 1_048_576).unwrap();
        let mut buf = buffer_with(&frame);
        match decode_metadata(&mut buf).unwrap() {
            DecodeOutcome::Complete(meta) => {
                assert_eq!(meta.file_name, "report.pdf");
                assert_eq!(meta.file_size, 1_048_576);
            }
            DecodeOutcome::Incomplete => panic!("expected a complete frame"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn trailing_payload_survives_decode() {
        let mut wire = encode_metadata("a.txt", 5).unwrap();
        wire.extend_from_slice(b"hello");
        let mut buf = buffer_with(&wire);
        let DecodeOutcome::Complete(meta) = decode_metadata(&mut buf).unwrap() else {
            panic!("expected a complete frame");
        };
        assert_eq!(meta.file_size, 5);
        assert_eq!(buf.filled(), b"hello");
    }

    #[test]
    fn split_frame_decodes_once_all_bytes_arrive() {
        let frame = encode_metadata("split.bin", 42).unwrap();
        let (head, tail) = frame.split_at(frame.len() / 2);

        let mut buf = buffer_with(head);
        assert!(matches!(
            decode_metadata(&mut buf).unwrap(),
            DecodeOutcome::Incomplete
        ));
        // partial bytes were retained, not reset
        assert_eq!(buf.len(), head.len());

        buf.spare()[..tail.len()].copy_from_slice(tail);
        buf.advance(tail.len());
        let DecodeOutcome::Complete(meta) = decode_metadata(&mut buf).unwrap() else {
            panic!("expected a complete frame");
        };
        assert_eq!(meta.file_name, "split.bin");
        assert_eq!(meta.file_size, 42);
    }

    #[test]
    fn frame_without_end_marker_stays_incomplete() {
        let compressed = compress_text("a.txt|5").unwrap();
        let mut wire = (compressed.len() as u64).to_be_bytes().to_vec();
        wire.extend_from_slice(&compressed);
        let len = wire.len();
        let mut buf = buffer_with(&wire);
        assert!(matches!(
            decode_metadata(&mut buf).unwrap(),
            DecodeOutcome::Incomplete
        ));
        assert_eq!(buf.len(), len);
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut wire = (u64::MAX).to_be_bytes().to_vec();
        wire.extend_from_slice(b"junk");
        let mut buf = buffer_with(&wire);
        assert!(matches!(
            decode_metadata(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn delimiter_in_file_name_is_refused_at_encode() {
        assert!(matches!(
            encode_metadata("evil|name", 1),
            Err(ProtocolError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn garbage_metadata_is_malformed() {
        let compressed = compress_text("no-delimiter-here|END").unwrap();
        let mut wire = (compressed.len() as u64).to_be_bytes().to_vec();
        wire.extend_from_slice(&compressed);
        let mut buf = buffer_with(&wire);
        assert!(matches!(
            decode_metadata(&mut buf),
            Err(ProtocolError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn action_decode_consumes_exactly_one_byte() {
        let mut buf = buffer_with(&[super::super::ACTION_RECEIVE, 0xAA, 0xBB]);
        assert_eq!(decode_action(&mut buf).unwrap(), Action::Receive);
        assert_eq!(buf.filled(), &[0xAA, 0xBB]);
    }
}
