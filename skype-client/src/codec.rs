//! Reading frames off an async byte stream.
//!
//! The pure framing rules live in [`skype_proto::packet`]; this is the
//! blocking-read half that pulls exactly one header line and `BYTELEN`
//! payload bytes at a time.

use skype_proto::packet::{self, Frame, Header};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::errors::ClientError;

/// Longest header line accepted before giving up on the stream.
pub const MAX_LINE_LEN: usize = 4096;

/// Read the next frame.
///
/// `Ok(None)` on a clean end of stream between frames. A stream that ends
/// inside a line or inside a payload is a framing error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(if line.len() >= MAX_LINE_LEN {
            ClientError::Framing(format!("packet line exceeds {MAX_LINE_LEN} bytes"))
        } else {
            ClientError::Framing("stream ended inside a packet line".into())
        });
    }

    let raw = packet::strip_line_ending(&line)?;
    let header = Header::parse(&String::from_utf8_lossy(raw))?;

    let mut payload = vec![0u8; header.len];
    let mut got = 0;
    while got < header.len {
        let n = reader.read(&mut payload[got..]).await?;
        if n == 0 {
            return Err(packet::Error::Truncated { expected: header.len, got }.into());
        }
        got += n;
    }
    tracing::trace!("[skype] <- {} {} ({} bytes)", header.command, header.params, header.len);
    Ok(Some(Frame { header, payload }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skype_proto::{Packet, Session};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn frames_in_sequence() {
        let mut wire = packet::encode(1, "CNT", "CON", b"<nonce>n</nonce>", None);
        wire.extend_from_slice(b"PNG 2 CON 2\n\r\n");
        let mut reader = BufReader::new(&wire[..]);

        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        let (pkt, _) = frame.into_packet().unwrap();
        assert_eq!(pkt, Packet::new("CNT", "CON", b"<nonce>n</nonce>".to_vec()));

        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(frame.header.command, "PNG");
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn short_payload_is_fatal() {
        let mut reader = BufReader::new(&b"SDG 1 MSGR 10\r\n\r\nabc"[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, ClientError::Framing(ref m) if m.contains("5 of 10")));
    }

    #[tokio::test]
    async fn partial_line_and_bare_cr() {
        let mut reader = BufReader::new(&b"SDG 1 MS"[..]);
        assert!(matches!(read_frame(&mut reader).await, Err(ClientError::Framing(_))));

        let mut reader = BufReader::new(&b"SDG 1\rMSGR 0\r\n"[..]);
        assert!(matches!(read_frame(&mut reader).await, Err(ClientError::Framing(_))));
    }

    #[tokio::test]
    async fn benign_status_then_packet() {
        let wire = b"715 3 MSGR 2\r\n\r\nPUT 4 MSGR\\PRESENCE 2\r\n\r\n";
        let mut reader = BufReader::new(&wire[..]);
        let mut session = Session::new();

        let first = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(session.accept(first).unwrap(), None);
        let second = read_frame(&mut reader).await.unwrap().unwrap();
        let pkt = session.accept(second).unwrap().unwrap();
        assert_eq!(pkt.command, "PUT");
    }
}
