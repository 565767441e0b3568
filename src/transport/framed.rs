//! Framed send/receive over any async byte stream.
//!
//! Each call wraps its whole operation in its own deadline, so a timeout in
//! one exchange never leaks into the next. Short writes and short reads are
//! retried until the exact byte count is reached or the stream fails.

use std::io::ErrorKind;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::{ClientError, FramePhase, Result};
use crate::protocol::{build_frame, Frame, Header, HEADER_SIZE};

/// Largest payload [`receive_frame`] accepts before allocating.
///
/// Acks are a few bytes and a winners list of a million ids fits well under it.
pub const DEFAULT_MAX_RECEIVE_SIZE: usize = 16 * 1024 * 1024;

fn send_phase(written: usize) -> FramePhase {
    if written < HEADER_SIZE {
        FramePhase::SendHeader
    } else {
        FramePhase::SendPayload
    }
}

/// Write the whole buffer, continuing after short writes.
///
/// `written` tracks progress so a caller can tell which phase a failure hit
/// even if this future is dropped by a deadline.
async fn write_all_tracked<W>(writer: &mut W, buf: &[u8], written: &mut usize) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    while *written < buf.len() {
        match writer.write(&buf[*written..]).await {
            Ok(0) => {
                return Err(ClientError::ConnectionClosed {
                    phase: send_phase(*written),
                })
            }
            Ok(n) => *written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ClientError::io(send_phase(*written), e)),
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| ClientError::io(send_phase(*written), e))
}

/// Write a full frame buffer (header first), retrying short writes.
pub async fn write_all_retrying<W>(writer: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0;
    write_all_tracked(writer, buf, &mut written).await
}

/// Fill `buf` exactly, retrying short reads.
///
/// EOF before the buffer is full is reported as a truncated frame.
pub async fn read_exact_retrying<R>(reader: &mut R, buf: &mut [u8], phase: FramePhase) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Err(ClientError::ConnectionClosed { phase }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ClientError::io(phase, e)),
        }
    }
    Ok(())
}

/// Send one frame within `deadline`.
///
/// Data frames go out as `%08d` header plus payload; END goes out as the
/// bare 8-byte marker.
pub async fn send_frame<W>(writer: &mut W, frame: &Frame, deadline: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = build_frame(frame)?;
    let mut written = 0;

    let result = timeout(deadline, write_all_tracked(writer, &bytes, &mut written)).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(ClientError::Timeout {
            phase: send_phase(written),
            after: deadline,
        }),
    }
}

/// Read one header and whatever payload it announces.
async fn read_frame<R>(reader: &mut R, phase: &mut FramePhase, max_payload: usize) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_SIZE];
    read_exact_retrying(reader, &mut header, FramePhase::ReceiveHeader).await?;

    match Header::decode(&header)? {
        Header::End => Ok(Frame::End),
        Header::Length(0) => Ok(Frame::Data(Bytes::new())),
        Header::Length(len) if len > max_payload => Err(ClientError::Protocol(format!(
            "announced payload of {} bytes exceeds maximum {}",
            len, max_payload
        ))),
        Header::Length(len) => {
            *phase = FramePhase::ReceivePayload;
            let mut payload = vec![0u8; len];
            read_exact_retrying(reader, &mut payload, FramePhase::ReceivePayload).await?;
            Ok(Frame::Data(Bytes::from(payload)))
        }
    }
}

/// Receive one frame within `deadline`.
///
/// A `00000000` header yields an empty data frame. The END marker yields
/// [`Frame::End`] and no payload is read behind it. Payloads over
/// [`DEFAULT_MAX_RECEIVE_SIZE`] are refused.
pub async fn receive_frame<R>(reader: &mut R, deadline: Duration) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    receive_frame_with_limit(reader, deadline, DEFAULT_MAX_RECEIVE_SIZE).await
}

/// [`receive_frame`] with an explicit payload cap, checked before any
/// payload buffer is allocated.
pub async fn receive_frame_with_limit<R>(
    reader: &mut R,
    deadline: Duration,
    max_payload: usize,
) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut phase = FramePhase::ReceiveHeader;

    let result = timeout(deadline, read_frame(reader, &mut phase, max_payload)).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => Err(ClientError::Timeout {
            phase,
            after: deadline,
        }),
    }
}

/// Receive one data frame's payload; END here is a protocol violation.
pub async fn receive_data<R>(reader: &mut R, deadline: Duration) -> Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match receive_frame(reader, deadline).await? {
        Frame::Data(payload) => Ok(payload),
        Frame::End => Err(ClientError::Protocol(
            "unexpected END marker where a data frame was expected".to_string(),
        )),
    }
}
