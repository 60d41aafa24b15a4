//! Field writer producing the little-endian layout read by [`WireReader`].
//!
//! [`WireReader`]: crate::reader::WireReader

use crate::datetime;
use chrono::{DateTime, Utc};
use hpcview_core::value::TaskIdentifier;
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Saturates at `i32::MAX`; readers reject anything above their field limit.
    pub fn write_len(&mut self, len: usize) {
        self.write_i32(i32::try_from(len).unwrap_or(i32::MAX));
    }

    pub fn write_binary(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.write_raw(bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.write_len(units.len() * 2);
        for unit in units {
            self.buf.extend_from_slice(&unit.to_le_bytes());
        }
    }

    pub fn write_string_list(&mut self, items: &[String]) {
        self.write_len(items.len());
        for item in items {
            self.write_string(item);
        }
    }

    pub fn write_nullable_string(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.write_bool(false);
                self.write_string(s);
            }
            None => self.write_bool(true),
        }
    }

    pub fn write_guid(&mut self, id: &Uuid) {
        self.write_raw(id.as_bytes());
    }

    pub fn write_datetime(&mut self, dt: &DateTime<Utc>) {
        self.write_i64(datetime::to_binary(dt));
    }

    pub fn write_task_id(&mut self, id: &TaskIdentifier) {
        self.write_i32(id.parent_job_id);
        self.write_i32(id.job_task_id);
        self.write_i32(id.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_is_utf16le_with_byte_length() {
        let mut w = WireWriter::new();
        w.write_string("ab");
        assert_eq!(w.as_bytes(), &[4, 0, 0, 0, b'a', 0, b'b', 0]);
    }

    #[test]
    fn test_empty_string_and_binary() {
        let mut w = WireWriter::new();
        w.write_string("");
        w.write_binary(&[]);
        assert_eq!(w.into_bytes(), vec![0; 8]);
    }

    #[test]
    fn test_nullable_string_marker() {
        let mut w = WireWriter::new();
        w.write_nullable_string(None);
        assert_eq!(w.as_bytes(), &[1]);
    }
}
