//! Protocol constants and tuning parameters.

use std::time::Duration;

// ============================================================================
// Piece geometry
// ============================================================================

/// Default piece size in bytes. A seed whose file is smaller than this
/// collapses the piece size down to the file size.
pub const DEFAULT_PIECE_SIZE: u64 = 65536;

// ============================================================================
// Wire framing
// ============================================================================

/// Maximum length of a single newline-terminated message. A base64 piece
/// payload grows by ~33%, so this leaves ample room above the default piece
/// size; a longer line is a protocol violation.
pub const MAX_LINE_LENGTH: usize = 512 * 1024;

/// Initial capacity of a connection's receive buffer.
pub const READ_BUFFER_CAPACITY: usize = 32 * 1024;

// ============================================================================
// Node internals
// ============================================================================

/// Capacity of the event channel feeding the node task.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Interval between progress report lines while downloading.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
