//! QRTR error types.

use std::fmt;

/// Error kinds a Bus, Node, or Client operation can fail with.
#[derive(Debug)]
pub enum QrtrError {
    /// Kernel refused to create a QRTR socket (e.g. family not supported).
    /// Fatal for Bus or Client construction.
    SocketCreate(i32),
    /// `sendto`/`recvfrom`/`getsockname` returned an OS error.
    SocketIo(i32),
    /// Initial `NEW_LOOKUP` did not complete within the configured window.
    LookupTimeout { waited_ms: u32 },
    /// `wait_for_node` expired.
    TimedOut,
    /// Operation explicitly cancelled.
    Cancelled,
    /// Control datagram shorter than `struct qrtr_ctrl_pkt`. Recoverable.
    ShortPacket { len: usize },
    /// Control packet with an opcode other than NEW_SERVER/DEL_SERVER. Recoverable.
    UnknownCmd(u32),
    /// `DEL_SERVER` for a port with no matching entry. Recoverable.
    UnknownPort(u32),
}

impl fmt::Display for QrtrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SocketCreate(errno) => write!(f, "failed to create QRTR socket: errno {errno}"),
            Self::SocketIo(errno) => write!(f, "QRTR socket I/O error: errno {errno}"),
            Self::LookupTimeout { waited_ms } => {
                write!(f, "initial NEW_LOOKUP did not complete within {waited_ms} ms")
            }
            Self::TimedOut => write!(f, "wait_for_node timed out"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::ShortPacket { len } => write!(f, "short control packet ({len} bytes)"),
            Self::UnknownCmd(cmd) => write!(f, "unknown control command {cmd}"),
            Self::UnknownPort(port) => write!(f, "DEL_SERVER for unknown port {port}"),
        }
    }
}

impl std::error::Error for QrtrError {}

pub type QrtrResult<T> = std::result::Result<T, QrtrError>;
