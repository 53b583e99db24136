//! Signature-based content-type detection over the first bytes of an object.

use std::io::{self, SeekFrom};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Number of leading bytes considered when sniffing.
pub const SNIFF_LEN: usize = 512;

/// Fallback for content that is neither recognised nor text.
pub const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Read up to [`SNIFF_LEN`] bytes from `source`, classify them, and seek the
/// source back to its start.
///
/// # Errors
///
/// Returns any error from reading or seeking the source.
pub async fn detect<R>(source: &mut R) -> io::Result<&'static str>
where
    R: AsyncRead + AsyncSeek + Unpin + ?Sized,
{
    let mut prefix = vec![0_u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let read = source.read(&mut prefix[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    source.seek(SeekFrom::Start(0)).await?;
    Ok(content_type(&prefix[..filled]))
}

/// Classify a byte prefix.
#[must_use]
pub fn content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    if let Some(found) = text_signature(data).or_else(|| binary_signature(data)) {
        return found;
    }
    if data.iter().any(|byte| is_binary(*byte)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn text_signature(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFE, 0xFF]) {
        return Some("text/plain; charset=utf-16be");
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return Some("text/plain; charset=utf-16le");
    }
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some(TEXT_PLAIN);
    }

    let trimmed = trim_leading_whitespace(data);
    let html_tags: [&[u8]; 6] = [
        b"<!DOCTYPE HTML",
        b"<HTML",
        b"<HEAD",
        b"<BODY",
        b"<SCRIPT",
        b"<!--",
    ];
    if html_tags.iter().any(|tag| tag_matches(trimmed, tag)) {
        return Some("text/html; charset=utf-8");
    }
    if trimmed.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    None
}

fn binary_signature(data: &[u8]) -> Option<&'static str> {
    const EXACT: [(&[u8], &str); 14] = [
        (b"%PDF-", "application/pdf"),
        (b"%!PS-Adobe-", "application/postscript"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"OggS\x00", "application/ogg"),
        (b"ID3", "audio/mpeg"),
        (b"\x1A\x45\xDF\xA3", "video/webm"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1F\x8B\x08", "application/x-gzip"),
        (b"Rar!\x1A\x07", "application/x-rar-compressed"),
        (b"\x00asm", "application/wasm"),
    ];
    if let Some((_, found)) = EXACT.iter().find(|(magic, _)| data.starts_with(magic)) {
        return Some(*found);
    }
    if data.len() >= 12 && data.starts_with(b"RIFF") {
        match &data[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wave"),
            b"AVI " => return Some("video/avi"),
            _ => {}
        }
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    None
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|byte| !matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match that also requires a terminating byte, so
/// `<HTMLX` does not count as HTML.
fn tag_matches(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() || !data[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    tag == b"<!--" || matches!(data[tag.len()], b' ' | b'>')
}

const fn is_binary(byte: u8) -> bool {
    matches!(byte, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn signatures_are_recognised() {
        let cases: [(&[u8], &str); 11] = [
            (b"%PDF-1.7 rest", "application/pdf"),
            (b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", "image/png"),
            (b"\xFF\xD8\xFF\xE0\0\x10JFIF", "image/jpeg"),
            (b"\0\0\0\x20ftypisom\0\0\x02\0", "video/mp4"),
            (b"RIFF\0\0\0\0WEBPVP8 ", "image/webp"),
            (b"  \n<!doctype html><html>", "text/html; charset=utf-8"),
            (b"<?xml version=\"1.0\"?>", "text/xml; charset=utf-8"),
            (b"\x1F\x8B\x08\0\0\0\0\0", "application/x-gzip"),
            (b"plain words only", TEXT_PLAIN),
            (b"", TEXT_PLAIN),
            (b"\x00\x01\x02binary", OCTET_STREAM),
        ];
        for (data, expected) in cases {
            assert_eq!(content_type(data), expected, "input {data:?}");
        }
    }

    #[tokio::test]
    async fn detect_rewinds_source_after_sniffing() -> anyhow::Result<()> {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.resize(2 * SNIFF_LEN, b'x');
        let mut source = Cursor::new(body);

        assert_eq!(detect(&mut source).await?, "application/pdf");
        assert_eq!(source.position(), 0);

        let mut short = Cursor::new(b"hi".to_vec());
        assert_eq!(detect(&mut short).await?, TEXT_PLAIN);
        assert_eq!(short.position(), 0);
        Ok(())
    }
}
