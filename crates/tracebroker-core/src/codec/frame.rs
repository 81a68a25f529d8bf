//! Length-prefixed framing for the tracer transport.
//!
//! Frames are `[4-byte big-endian length][opaque blob]`. `FrameAccumulator`
//! holds onto whatever bytes have arrived so far so it can be fed in
//! arbitrarily small chunks from an async read loop without losing partial
//! progress across cancellation points — it never assumes a whole frame
//! arrives in one read.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::BrokerError;

pub const LENGTH_PREFIX_BYTES: usize = 4;

#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: BytesMut,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append freshly-read bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull one complete frame's payload out of the buffer, if one has fully
    /// arrived. Leaves any trailing partial frame in place for next time.
    pub fn try_take_frame(&mut self) -> Result<Option<Bytes>, BrokerError> {
        if self.buf.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.buf[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
        if self.buf.len() < LENGTH_PREFIX_BYTES + len {
            return Ok(None);
        }
        self.buf.advance(LENGTH_PREFIX_BYTES);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_a_frame_split_across_many_pushes() {
        let mut acc = FrameAccumulator::new();
        let frame = FrameAccumulator::encode_frame(b"hello world");
        for byte in &frame {
            assert!(acc.try_take_frame().unwrap().is_none());
            acc.push(std::slice::from_ref(byte));
        }
        let payload = acc.try_take_frame().unwrap().unwrap();
        assert_eq!(&payload[..], b"hello world");
        assert!(acc.is_empty());
    }

    #[test]
    fn handles_back_to_back_frames_in_one_push() {
        let mut acc = FrameAccumulator::new();
        let mut bytes = FrameAccumulator::encode_frame(b"one");
        bytes.extend(FrameAccumulator::encode_frame(b"two"));
        acc.push(&bytes);
        assert_eq!(&acc.try_take_frame().unwrap().unwrap()[..], b"one");
        assert_eq!(&acc.try_take_frame().unwrap().unwrap()[..], b"two");
        assert!(acc.try_take_frame().unwrap().is_none());
    }

    #[test]
    fn empty_buffer_is_not_mid_frame() {
        let acc = FrameAccumulator::new();
        assert!(acc.is_empty());
    }
}
