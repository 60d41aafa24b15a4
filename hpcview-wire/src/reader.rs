//! Field reader over a byte stream.
//!
//! The transport may hand back fewer bytes than asked for, so every field
//! read loops until the full width has arrived before it is interpreted.

use crate::datetime;
use chrono::{DateTime, Utc};
use hpcview_core::error::WireError;
use hpcview_core::value::TaskIdentifier;
use std::io::{ErrorKind, Read};
use uuid::Uuid;

/// Largest length prefix accepted for strings, binaries and lists.
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

pub struct WireReader<'a> {
    inner: &'a mut dyn Read,
    consumed: u64,
}

impl<'a> WireReader<'a> {
    pub fn new(inner: &'a mut dyn Read) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Fill `buf` completely, looping over short reads.
    pub fn read_full(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(WireError::UnexpectedEof {
                        needed: buf.len(),
                        got: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.consumed += buf.len() as u64;
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut buf = [0u8; N];
        self.read_full(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a 4-byte length prefix, rejecting negative or oversized values.
    pub fn read_len(&mut self, field: &'static str) -> Result<usize, WireError> {
        let len = self.read_i32()?;
        if len < 0 || len as usize > MAX_FIELD_LEN {
            return Err(WireError::InvalidLength {
                field,
                length: len as i64,
            });
        }
        Ok(len as usize)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, WireError> {
        let mut buf = vec![0u8; len];
        self.read_full(&mut buf)?;
        Ok(buf)
    }

    /// `[len:4][bytes]`
    pub fn read_binary(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.read_len("binary")?;
        self.read_bytes(len)
    }

    /// UTF-16LE string, `[byteLen:4][bytes]`.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_len("string")?;
        if len % 2 != 0 {
            return Err(WireError::InvalidString {
                reason: format!("odd byte length {}", len),
            });
        }
        let bytes = self.read_bytes(len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|e| WireError::InvalidString {
            reason: e.to_string(),
        })
    }

    /// `[count:4]` followed by `count` strings.
    pub fn read_string_list(&mut self) -> Result<Vec<String>, WireError> {
        let count = self.read_len("string-list")?;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(self.read_string()?);
        }
        Ok(items)
    }

    /// `[isNull:1][string?]`
    pub fn read_nullable_string(&mut self) -> Result<Option<String>, WireError> {
        if self.read_bool()? {
            Ok(None)
        } else {
            self.read_string().map(Some)
        }
    }

    pub fn read_guid(&mut self) -> Result<Uuid, WireError> {
        Ok(Uuid::from_bytes(self.read_array::<16>()?))
    }

    pub fn read_datetime(&mut self) -> Result<DateTime<Utc>, WireError> {
        datetime::from_binary(self.read_i64()?)
    }

    pub fn read_task_id(&mut self) -> Result<TaskIdentifier, WireError> {
        let parent_job_id = self.read_i32()?;
        let job_task_id = self.read_i32()?;
        let instance_id = self.read_i32()?;
        Ok(TaskIdentifier::new(parent_job_id, job_task_id, instance_id))
    }
}
