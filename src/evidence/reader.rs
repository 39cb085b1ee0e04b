// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::WireError;

/// Bounds-checked cursor over attacker-supplied bytes.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::MalformedEvidenceData);
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes, consuming the
    /// terminator. The terminator is not part of the returned slice.
    pub(crate) fn c_str(&mut self, max_len: usize) -> Result<&'a [u8], WireError> {
        let window = &self.bytes[self.position..];
        let window = &window[..window.len().min(max_len + 1)];
        let len = window
            .iter()
            .position(|&b| b == 0)
            .ok_or(WireError::MalformedEvidenceData)?;
        let raw = self.take(len)?;
        self.take(1)?;
        Ok(raw)
    }

    /// Everything not yet consumed.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.position..];
        self.position = self.bytes.len();
        rest
    }
}
