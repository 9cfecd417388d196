//! Serialize and deserialize lookup messages.

use std::convert::TryFrom;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::common::Id;
use crate::{Error, Result};

#[derive(Debug, PartialEq, Eq, Clone)]
/// Ask a node for the ids it knows closest to `target`.
pub struct SeekRequest {
    /// Request id, echoed back in the matching [SeekResponse].
    pub id: Bytes,
    pub target: Id,
    /// Only return ids strictly closer to the target than the responder itself.
    pub must_be_closer: bool,
    /// The requester.
    pub from: Id,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SeekResponse {
    /// Id of the request this answers.
    pub id: Bytes,
    /// Candidates, closest to the target first.
    pub nodes: Vec<Id>,
}

impl SeekRequest {
    /// Layout: `u16` request id length, request id, `u8` flag, `u16` target
    /// length, target, then the requester's id up to the end.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let id_len =
            u16::try_from(self.id.len()).map_err(|_| Error::Encode("request id too long"))?;
        let target_len =
            u16::try_from(self.target.len()).map_err(|_| Error::Encode("target too long"))?;

        let mut buf =
            BytesMut::with_capacity(5 + self.id.len() + self.target.len() + self.from.len());

        buf.put_u16(id_len);
        buf.put_slice(&self.id);
        buf.put_u8(self.must_be_closer as u8);
        buf.put_u16(target_len);
        buf.put_slice(self.target.as_bytes());
        buf.put_slice(self.from.as_bytes());

        Ok(buf.freeze())
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<SeekRequest> {
        let mut buf = bytes.as_ref();

        let id_len = get_u16(&mut buf)? as usize;
        let id = take(&mut buf, id_len)?;

        let must_be_closer = match get_u8(&mut buf)? {
            0 => false,
            1 => true,
            _ => return Err(Error::Decode("invalid must_be_closer flag")),
        };

        let target_len = get_u16(&mut buf)? as usize;
        let target = Id::try_from(take(&mut buf, target_len)?)
            .map_err(|_| Error::Decode("empty target"))?;

        let from = Id::try_from(Bytes::copy_from_slice(buf))
            .map_err(|_| Error::Decode("missing requester id"))?;

        Ok(SeekRequest {
            id,
            target,
            must_be_closer,
            from,
        })
    }
}

impl SeekResponse {
    /// Layout: `u8` request id length, request id, `u16` count, `u8` element
    /// size, then `count` ids of `size` bytes each.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let id_len =
            u8::try_from(self.id.len()).map_err(|_| Error::Encode("request id too long"))?;
        let count =
            u16::try_from(self.nodes.len()).map_err(|_| Error::Encode("too many nodes"))?;

        let size = self.nodes.first().map(|node| node.len()).unwrap_or(0);
        if self.nodes.iter().any(|node| node.len() != size) {
            return Err(Error::MixedIdLengths);
        }
        let size = u8::try_from(size).map_err(|_| Error::Encode("node id too long"))?;

        let mut buf = BytesMut::with_capacity(4 + self.id.len() + self.nodes.len() * size as usize);

        buf.put_u8(id_len);
        buf.put_slice(&self.id);
        buf.put_u16(count);
        buf.put_u8(size);
        for node in &self.nodes {
            buf.put_slice(node.as_bytes());
        }

        Ok(buf.freeze())
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<SeekResponse> {
        let mut buf = bytes.as_ref();

        let id_len = get_u8(&mut buf)? as usize;
        let id = take(&mut buf, id_len)?;

        let count = get_u16(&mut buf)? as usize;
        let size = get_u8(&mut buf)? as usize;

        if count > 0 && size == 0 {
            return Err(Error::Decode("empty node id"));
        }
        if buf.len() != count * size {
            return Err(Error::Decode("nodes length doesn't match count"));
        }

        let nodes = buf
            .chunks_exact(size.max(1))
            .take(count)
            .map(|chunk| Id::from_bytes(chunk))
            .collect::<Result<Vec<_>>>()?;

        Ok(SeekResponse { id, nodes })
    }
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::Decode("unexpected end of message"));
    }

    Ok(buf.get_u8())
}

fn get_u16(buf: &mut &[u8]) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::Decode("unexpected end of message"));
    }

    Ok(buf.get_u16())
}

fn take(buf: &mut &[u8], len: usize) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(Error::Decode("unexpected end of message"));
    }

    Ok(buf.copy_to_bytes(len))
}
