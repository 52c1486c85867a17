//! Peer TCP wire messages.
//!
//! Framing: one JSON object in, one JSON object back, then the
//! connection closes. A message is considered complete either at a
//! `\n` terminator or once 4096 bytes have been read without one,
//! whichever comes first — see `read_frame`/`write_frame`.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const MAX_FRAME_BYTES: usize = 4096;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerRequest {
    #[serde(rename = "ELECTION")]
    Election { candidate_id: u64 },
    #[serde(rename = "LEADER")]
    Leader {
        leader_id: u64,
        leader_host: String,
        leader_socket_port: u16,
    },
    #[serde(rename = "GET_VAR")]
    GetVar,
    #[serde(rename = "SET_VAR")]
    SetVar { value: i64 },
    #[serde(rename = "PING")]
    Ping,
}

/// A flat response envelope covering every reply shape the peer
/// protocol produces. Fields are `None`/absent unless the particular
/// reply needs them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PeerResponse {
    pub fn status(s: impl Into<String>) -> Self {
        PeerResponse { status: Some(s.into()), ..Default::default() }
    }

    pub fn error(e: impl Into<String>) -> Self {
        PeerResponse { error: Some(e.into()), ..Default::default() }
    }

    pub fn error_with_leader(e: impl Into<String>, leader_id: u64) -> Self {
        PeerResponse { error: Some(e.into()), leader_id: Some(leader_id), ..Default::default() }
    }

    pub fn comm_error(details: impl Into<String>) -> Self {
        PeerResponse {
            error: Some("SOCKET_COMM_ERROR".into()),
            details: Some(details.into()),
            ..Default::default()
        }
    }

    pub fn is_comm_error(&self) -> bool {
        self.error.as_deref() == Some("SOCKET_COMM_ERROR")
    }

    pub fn is_leader_loss_error(&self) -> bool {
        matches!(self.error.as_deref(), Some("NODE_KILLED") | Some("NOT_LEADER"))
    }

    /// True when the peer accepted the connection but sent back
    /// nothing, distinct from a `SOCKET_COMM_ERROR`.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.error.is_none() && self.value.is_none() && self.leader_id.is_none()
    }
}

/// Reads one frame from `stream`: bytes up to (and excluding) a `\n`,
/// or up to `MAX_FRAME_BYTES` if no newline arrives first.
pub async fn read_frame<R: AsyncReadExt + Unpin>(stream: &mut R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        if buf.len() >= MAX_FRAME_BYTES {
            break;
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    Ok(buf)
}

/// Writes `payload` followed by a newline terminator.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(stream: &mut W, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(payload).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_through_json() {
        let req = PeerRequest::Election { candidate_id: 7 };
        let encoded = serde_json::to_string(&req).unwrap();
        assert_eq!(encoded, r#"{"type":"ELECTION","candidate_id":7}"#);
        let decoded: PeerRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_omits_absent_fields() {
        let resp = PeerResponse::status("LEADER");
        let encoded = serde_json::to_string(&resp).unwrap();
        assert_eq!(encoded, r#"{"status":"LEADER"}"#);
    }

    #[tokio::test]
    async fn frame_round_trip_over_newline() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame, b"hello");
    }
}
