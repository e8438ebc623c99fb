//! Scatter-gather transfer coordinator.
//!
//! Walks an ordered fragment list over one linear device range:
//!
//! ```text
//!   device:  |<- start_block * block_size
//!            [ frag 0 ][ frag 1 ][ ... ][ frag n-1 ]
//!   cursor:  +0        +len0     +len0+len1 ...
//! ```
//!
//! Fragment directions, fragment lengths and the whole device span are
//! validated before the first unit moves; a failing fragment aborts the
//! whole call. A fragment list that does not add up to the expected byte
//! count still completes, but the mismatch is reported in
//! [`ScatterOutcome::short`] so a strict caller can fail the request
//! instead. A rejected list still carries the mismatch in
//! [`TransferError::FragmentLength`].

use core::fmt;

use super::{engine, Direction, Fragment, Result, TransferError};
use crate::log_debug;
use crate::logger::LogSource;
use crate::mmio::{MmioWindow, UNIT_SIZE};

/// Fragment accounting mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortTransfer {
    /// Bytes the request announced
    pub expected_bytes: usize,
    /// Bytes the fragment list actually moved
    pub transferred_bytes: usize,
}

impl ShortTransfer {
    /// `expected - transferred`; negative when the list moved too much.
    pub fn deficit(&self) -> i64 {
        self.expected_bytes as i64 - self.transferred_bytes as i64
    }
}

impl fmt::Display for ShortTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scatter list moved {} of {} expected bytes",
            self.transferred_bytes, self.expected_bytes
        )
    }
}

/// What a completed scatter request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterOutcome {
    pub bytes_transferred: usize,
    /// Set when the fragments did not add up to the expected total
    pub short: Option<ShortTransfer>,
}

impl ScatterOutcome {
    pub fn is_exact(&self) -> bool {
        self.short.is_none()
    }

    /// Turn the accounting diagnostic into an error.
    pub fn into_strict(self) -> Result<usize> {
        match self.short {
            Some(short) => Err(TransferError::ShortTransfer(short)),
            None => Ok(self.bytes_transferred),
        }
    }
}

/// Move every fragment in order, starting at `start_block * block_size`.
pub fn run<W: MmioWindow>(
    window: &mut W,
    direction: Direction,
    start_block: u64,
    fragments: &mut [Fragment<'_>],
    expected_bytes: usize,
    block_size: usize,
) -> Result<ScatterOutcome> {
    if let Some(index) = fragments.iter().position(|f| f.direction() != direction) {
        return Err(TransferError::DirectionMismatch { index });
    }

    let mut total = 0usize;
    for fragment in fragments.iter() {
        total = total.checked_add(fragment.len()).ok_or(TransferError::OutOfRange {
            offset: start_block.saturating_mul(block_size as u64),
            len: usize::MAX,
            window: window.len(),
        })?;
    }
    let short = (total != expected_bytes).then_some(ShortTransfer {
        expected_bytes,
        transferred_bytes: total,
    });

    // Every fragment and the whole span are checked before the first unit
    // moves, so a rejected list leaves the device untouched.
    if let Some(index) = fragments.iter().position(|f| f.len() % UNIT_SIZE != 0) {
        let len = fragments[index].len();
        log_debug!(
            LogSource::Transfer,
            "sg[{}]: {:#x} bytes is not whole units",
            index,
            len
        );
        return Err(TransferError::FragmentLength { index, len, short });
    }

    let out_of_range = TransferError::OutOfRange {
        offset: start_block.saturating_mul(block_size as u64),
        len: total,
        window: window.len(),
    };
    let mut cursor = start_block
        .checked_mul(block_size as u64)
        .ok_or(out_of_range)?;
    engine::check_range(window, cursor, total)?;

    let last = fragments.len().checked_sub(1);
    let mut transferred = 0usize;

    for (index, fragment) in fragments.iter_mut().enumerate() {
        let len = fragment.len();

        #[cfg(feature = "trace")]
        log_debug!(
            LogSource::Transfer,
            "sg[{}]: {} {:#x} bytes at {:#x}",
            index,
            direction.name(),
            len,
            cursor
        );

        if Some(index) == last && expected_bytes.checked_sub(transferred) != Some(len) {
            log_debug!(
                LogSource::Transfer,
                "sg[{}]: last fragment {:#x} bytes, {:#x} remaining",
                index,
                len,
                expected_bytes.saturating_sub(transferred)
            );
        }

        let moved = engine::transfer(window, cursor, fragment)?;
        transferred += moved;
        cursor = cursor.checked_add(moved as u64).ok_or(out_of_range)?;
    }

    if let Some(s) = short {
        log_debug!(
            LogSource::Transfer,
            "scatter {}: expected {:#x}, moved {:#x}",
            direction.name(),
            s.expected_bytes,
            s.transferred_bytes
        );
    }

    Ok(ScatterOutcome {
        bytes_transferred: transferred,
        short,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmio::{MmioMapper, SimulatedBus, SimulatedWindow};
    use alloc::vec;

    const BS: usize = 512;

    fn setup(blocks: usize) -> (SimulatedBus, SimulatedWindow) {
        let mut bus = SimulatedBus::new(0, blocks * BS);
        let window = bus.map(0, blocks * BS).unwrap();
        (bus, window)
    }

    #[test]
    fn test_exact_fragments_report_no_diagnostic() {
        let (bus, mut window) = setup(8);
        let a = [0x11u8; 512];
        let b = [0x22u8; 256];
        let c = [0x33u8; 256];
        let mut frags = [Fragment::Write(&a), Fragment::Write(&b), Fragment::Write(&c)];

        let outcome = run(&mut window, Direction::Write, 2, &mut frags, 1024, BS).unwrap();
        assert_eq!(outcome.bytes_transferred, 1024);
        assert!(outcome.is_exact());
        assert_eq!(outcome.into_strict(), Ok(1024));

        let mut raw = [0u8; 1024];
        bus.peek(2 * BS, &mut raw);
        assert!(raw[..512].iter().all(|&x| x == 0x11));
        assert!(raw[512..768].iter().all(|&x| x == 0x22));
        assert!(raw[768..].iter().all(|&x| x == 0x33));
    }

    #[test]
    fn test_shortened_last_fragment_reports_deficit() {
        let (_bus, mut window) = setup(8);
        let a = [0u8; 512];
        let b = [0u8; 512 - 24];
        let mut frags = [Fragment::Write(&a), Fragment::Write(&b)];

        let outcome = run(&mut window, Direction::Write, 0, &mut frags, 1024, BS).unwrap();
        assert_eq!(outcome.bytes_transferred, 1000);
        let short = outcome.short.unwrap();
        assert_eq!(short.deficit(), 24);
        assert_eq!(
            outcome.into_strict(),
            Err(TransferError::ShortTransfer(short))
        );
    }

    #[test]
    fn test_overlong_list_reports_negative_deficit() {
        let (_bus, mut window) = setup(8);
        let mut a = [0u8; 512];
        let mut b = [0u8; 512];
        let mut frags = [Fragment::Read(&mut a), Fragment::Read(&mut b)];

        let outcome = run(&mut window, Direction::Read, 0, &mut frags, 512, BS).unwrap();
        assert_eq!(outcome.bytes_transferred, 1024);
        assert_eq!(outcome.short.unwrap().deficit(), -512);
    }

    #[test]
    fn test_empty_list() {
        let (_bus, mut window) = setup(1);
        let mut frags: [Fragment<'_>; 0] = [];

        let outcome = run(&mut window, Direction::Read, 0, &mut frags, 0, BS).unwrap();
        assert_eq!(outcome.bytes_transferred, 0);
        assert!(outcome.is_exact());

        let outcome = run(&mut window, Direction::Read, 0, &mut frags, 512, BS).unwrap();
        assert_eq!(outcome.short.unwrap().deficit(), 512);
    }

    #[test]
    fn test_misaligned_fragment_rejected_before_any_unit() {
        let (bus, mut window) = setup(8);
        let a = [0xAAu8; 64];
        let bad = [0xBBu8; 12];
        let c = [0xCCu8; 64];
        let mut frags = [Fragment::Write(&a), Fragment::Write(&bad), Fragment::Write(&c)];

        let result = run(&mut window, Direction::Write, 0, &mut frags, 140, BS);
        assert_eq!(
            result,
            Err(TransferError::FragmentLength {
                index: 1,
                len: 12,
                short: None
            })
        );
        assert_eq!(bus.unit_writes(), 0);
    }

    #[test]
    fn test_last_fragment_short_by_partial_unit_keeps_deficit() {
        let (bus, mut window) = setup(8);
        let a = [0x11u8; 512];
        let b = [0x22u8; 512 - 4];
        let mut frags = [Fragment::Write(&a), Fragment::Write(&b)];

        let err = run(&mut window, Direction::Write, 0, &mut frags, 1024, BS).unwrap_err();
        let TransferError::FragmentLength { index, len, short } = err else {
            panic!("unexpected error {:?}", err);
        };
        assert_eq!((index, len), (1, 508));
        assert_eq!(short.map(|s| s.deficit()), Some(4));
        assert_eq!(bus.unit_writes(), 0);
    }

    #[test]
    fn test_span_past_window_touches_nothing() {
        let (bus, mut window) = setup(2);
        let a = [0u8; 512];
        let b = [0u8; 512];
        let mut frags = [Fragment::Write(&a), Fragment::Write(&b)];

        assert_eq!(
            run(&mut window, Direction::Write, 1, &mut frags, 1024, BS),
            Err(TransferError::OutOfRange {
                offset: 512,
                len: 1024,
                window: 1024
            })
        );
        assert_eq!(bus.unit_writes(), 0);
    }

    #[test]
    fn test_direction_mismatch_checked_up_front() {
        let (bus, mut window) = setup(8);
        let a = [0u8; 64];
        let mut b = [0u8; 64];
        let mut frags = [Fragment::Write(&a), Fragment::Read(&mut b)];

        assert_eq!(
            run(&mut window, Direction::Write, 0, &mut frags, 128, BS),
            Err(TransferError::DirectionMismatch { index: 1 })
        );
        assert_eq!(bus.unit_writes(), 0);
    }

    #[test]
    fn test_read_gathers_into_fragments() {
        let (bus, mut window) = setup(4);
        let pattern: alloc::vec::Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
        bus.poke(BS, &pattern);

        let mut a = vec![0u8; 8];
        let mut b = vec![0u8; 1016];
        let mut frags = [Fragment::Read(&mut a), Fragment::Read(&mut b)];
        let outcome = run(&mut window, Direction::Read, 1, &mut frags, 1024, BS).unwrap();

        assert!(outcome.is_exact());
        assert_eq!(a[..], pattern[..8]);
        assert_eq!(b[..], pattern[8..]);
    }

    #[test]
    fn test_start_beyond_window() {
        let (_bus, mut window) = setup(2);
        let a = [0u8; 512];
        let mut frags = [Fragment::Write(&a)];

        assert!(matches!(
            run(&mut window, Direction::Write, 2, &mut frags, 512, BS),
            Err(TransferError::OutOfRange { .. })
        ));
        assert_eq!(
            run(&mut window, Direction::Write, u64::MAX, &mut frags, 512, BS),
            Err(TransferError::OutOfRange {
                offset: u64::MAX,
                len: 512,
                window: 1024
            })
        );
    }
}
