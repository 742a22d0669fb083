// Group ID Generator - snowflake-like 64-bit ids
// Layout: [timestamp:42][node_id:10][sequence:12]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::GroupId;
use crate::error::{AppError, AppResult};

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_NODE_ID: u16 = (1 << NODE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_MASK: u64 = 0x3FF_FFFF_FFFF;

/// Allows 1024 nodes and 4096 ids per millisecond per node.
///
/// The last timestamp and sequence live in one atomic word
/// (`timestamp << 12 | sequence`) so concurrent callers never hand out the
/// same pair.
#[derive(Debug)]
pub struct IdGenerator {
    node_id: u16,
    state: AtomicU64,
}

impl IdGenerator {
    pub fn new(node_id: u16) -> AppResult<Self> {
        if node_id > MAX_NODE_ID {
            return Err(AppError::ConfigurationError(format!(
                "Node id must be less than {}, got {}",
                MAX_NODE_ID as u32 + 1,
                node_id
            )));
        }

        Ok(Self {
            node_id,
            state: AtomicU64::new(0),
        })
    }

    fn current_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Generate the next unique id
    pub fn next_id(&self) -> GroupId {
        loop {
            let now = Self::current_millis() & TIMESTAMP_MASK;
            let prev = self.state.load(Ordering::Acquire);
            let prev_ts = prev >> SEQUENCE_BITS;
            let prev_seq = prev & SEQUENCE_MASK;

            // The clock may step backwards; keep issuing from the last timestamp.
            let (ts, seq) = if now > prev_ts {
                (now, 0)
            } else if prev_seq < SEQUENCE_MASK {
                (prev_ts, prev_seq + 1)
            } else {
                // Sequence exhausted for this millisecond
                std::thread::yield_now();
                continue;
            };

            let next = (ts << SEQUENCE_BITS) | seq;
            if self
                .state
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let id = (ts << (NODE_BITS + SEQUENCE_BITS))
                    | ((self.node_id as u64) << SEQUENCE_BITS)
                    | seq;
                return GroupId(id as i64);
            }
        }
    }

}
