//! Opcode-0 handshake.
//!
//! The negotiator writes the handshake and reads exactly one frame back,
//! before the read loop exists. Bytes that arrive behind the READY frame stay
//! in the decoder and are picked up by the read loop.

use crate::error::ClientError;
use drpc_protocol::message::READY_EVENT;
use drpc_protocol::{Decoder, Encoder, Frame, Handshake, Message, Opcode, ReadyData, RpcErrorData};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Performs the handshake exchange for one connection.
#[derive(Debug, Clone)]
pub struct HandshakeNegotiator {
    client_id: String,
    timeout: Duration,
    read_buffer_size: usize,
}

impl HandshakeNegotiator {
    pub fn new(client_id: impl Into<String>, timeout: Duration, read_buffer_size: usize) -> Self {
        Self {
            client_id: client_id.into(),
            timeout,
            read_buffer_size,
        }
    }

    /// Sends the handshake and waits for the READY dispatch.
    pub async fn negotiate<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        decoder: &mut Decoder,
    ) -> Result<ReadyData, ClientError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let encoded = Encoder::encode_handshake(&Handshake::new(&self.client_id))?;
        tracing::debug!(
            "Sending handshake for client {} ({} bytes)",
            self.client_id,
            encoded.len()
        );
        writer.write_all(&encoded).await.map_err(ClientError::Io)?;
        writer.flush().await.map_err(ClientError::Io)?;

        let frame = tokio::time::timeout(self.timeout, self.read_first_frame(reader, decoder))
            .await
            .map_err(|_| {
                tracing::debug!("Handshake timed out after {:?}", self.timeout);
                ClientError::HandshakeFailed {
                    reason: format!("no READY within {:?}", self.timeout),
                }
            })??;

        Self::accept(frame)
    }

    async fn read_first_frame<R>(
        &self,
        reader: &mut R,
        decoder: &mut Decoder,
    ) -> Result<Frame, ClientError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.read_buffer_size];

        loop {
            if let Some(frame) = decoder.decode_frame().map_err(malformed)? {
                return Ok(frame);
            }

            let n = reader.read(&mut buf).await.map_err(ClientError::Io)?;
            if n == 0 {
                return Err(ClientError::HandshakeFailed {
                    reason: "connection closed before READY".to_string(),
                });
            }
            decoder.extend(&buf[..n]);
        }
    }

    /// Checks that the first frame is the READY dispatch.
    fn accept(frame: Frame) -> Result<ReadyData, ClientError> {
        match frame.opcode {
            Opcode::Frame => {
                let msg = Message::from_value(frame.payload).map_err(malformed)?;
                if msg.is_dispatch() && msg.evt.as_deref() == Some(READY_EVENT) {
                    let ready: ReadyData = serde_json::from_value(msg.data).map_err(malformed)?;
                    tracing::debug!("Handshake complete (v={:?})", ready.v);
                    return Ok(ready);
                }
                if let Some(err) = msg.error_data() {
                    return Err(ClientError::HandshakeFailed {
                        reason: format!("[{}] {}", err.code, err.message),
                    });
                }
                Err(ClientError::HandshakeFailed {
                    reason: format!(
                        "expected READY dispatch, got cmd={:?} evt={:?}",
                        msg.cmd, msg.evt
                    ),
                })
            }
            Opcode::Close => {
                let err: RpcErrorData =
                    serde_json::from_value(frame.payload).unwrap_or(RpcErrorData {
                        code: 0,
                        message: "closed by host".to_string(),
                    });
                Err(ClientError::HandshakeFailed {
                    reason: format!("[{}] {}", err.code, err.message),
                })
            }
            other => Err(ClientError::HandshakeFailed {
                reason: format!("unexpected {other} frame before READY"),
            }),
        }
    }
}

/// A first frame that cannot be decoded fails the handshake.
fn malformed(err: impl std::fmt::Display) -> ClientError {
    ClientError::HandshakeFailed {
        reason: format!("malformed READY: {err}"),
    }
}
