//! Test protocol spoken between a tailperf client and a tailperf server.
//!
//! A session starts with a single handshake byte sent by the initiator
//! naming the test kind. There is no response to the handshake. For a
//! throughput test the responder then streams [`CHUNK_SIZE`]-byte chunks
//! until the initiator stops reading.

use std::fmt;

/// Well-known TCP port the test server listens on.
pub const PERF_TEST_PORT: u16 = 9898;

/// Size of each chunk written by the responder and of the initiator's read buffer.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Handshake byte requesting a throughput test.
pub const THROUGHPUT_BYTE: u8 = b'T';

/// Test kind requested by the initiator's handshake byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Throughput,
}

impl TestKind {
    /// Byte written on the wire for this kind.
    pub fn as_byte(self) -> u8 {
        match self {
            TestKind::Throughput => THROUGHPUT_BYTE,
        }
    }

    /// Decode a handshake byte. Reserved values yield `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            THROUGHPUT_BYTE => Some(TestKind::Throughput),
            _ => None,
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::Throughput => write!(f, "throughput"),
        }
    }
}
