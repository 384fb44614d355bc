//! A bounded ring buffer shared between one producer and one consumer, with three
//! policies for what happens when the producer catches up to the consumer.
//!
//! The buffer always keeps one slot empty so that `write_pos == read_pos` is
//! unambiguously "empty". A capacity-`n` buffer can hold at most `n - 1` elements.

use std::sync::Mutex;

use aio_sync::LockExt;

/// What a [`RingBuffer::write`] call does when there isn't enough free space for `src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
	/// Write nothing and report an error unless the whole slice fits.
	AllOrNone,
	/// Write as much of the prefix as fits, silently dropping the rest.
	Normal,
	/// Write the whole slice regardless of free space, advancing the read cursor past
	/// whatever oldest data gets overwritten.
	Override,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
	#[error("not enough free space for {requested} elements ({available} available)")]
	NotEnoughSpace { requested: usize, available: usize },
	#[error("scan width must be non-zero")]
	InvalidParameter,
}

struct Inner<T> {
	data: Vec<T>,
	read_pos: usize,
	write_pos: usize,
	/// Samples from an in-progress scan already consumed from the producer's packet but
	/// not yet folded into a complete scan boundary.
	extra: usize,
}

/// Copies `src` into `buf` starting at `*pos`, wrapping around the end of `buf` as many
/// times as necessary. Leaves `*pos` at the index one past the last element written.
fn write_wrapping<T: Copy>(buf: &mut [T], pos: &mut usize, src: &[T]) {
	let capacity = buf.len();
	let mut remaining = src;
	let mut cursor = *pos;
	while !remaining.is_empty() {
		let chunk_len = remaining.len().min(capacity - cursor);
		buf[cursor..cursor + chunk_len].copy_from_slice(&remaining[..chunk_len]);
		cursor = (cursor + chunk_len) % capacity;
		remaining = &remaining[chunk_len..];
	}
	*pos = cursor;
}

/// The inverse of [`write_wrapping`]: reads from `buf` starting at `*pos` into `dst`.
fn read_wrapping<T: Copy>(buf: &[T], pos: &mut usize, dst: &mut [T]) {
	let capacity = buf.len();
	let mut remaining = &mut dst[..];
	let mut cursor = *pos;
	while !remaining.is_empty() {
		let chunk_len = remaining.len().min(capacity - cursor);
		remaining[..chunk_len].copy_from_slice(&buf[cursor..cursor + chunk_len]);
		cursor = (cursor + chunk_len) % capacity;
		remaining = &mut remaining[chunk_len..];
	}
	*pos = cursor;
}

fn occupancy(capacity: usize, read_pos: usize, write_pos: usize) -> usize {
	(write_pos + capacity - read_pos) % capacity
}

/// A bounded ring buffer of `scan_width`-wide scans, generic over the element type so the
/// same structure backs both raw-count and calibrated-volt streams.
pub struct RingBuffer<T> {
	capacity: usize,
	scan_width: usize,
	inner: Mutex<Inner<T>>,
}

impl<T: Copy + Default> RingBuffer<T> {
	/// Builds a ring buffer of `S = scan_count * scan_width` elements. One slot of `S` is
	/// always kept empty so `read_pos == write_pos` means empty, not full. Usable capacity
	/// is `S - 1`.
	///
	/// # Panics
	/// Panics if `scan_width` is zero or `scan_count` is zero.
	#[must_use]
	pub fn new(scan_count: usize, scan_width: usize) -> Self {
		assert!(scan_width > 0, "scan_width must be non-zero");
		assert!(scan_count > 0, "scan_count must be non-zero");
		let capacity = scan_count * scan_width;
		Self {
			capacity,
			scan_width,
			inner: Mutex::new(Inner {
				data: vec![T::default(); capacity],
				read_pos: 0,
				write_pos: 0,
				extra: 0,
			}),
		}
	}

	/// Writes `src` according to `mode`, returning the number of elements actually written.
	///
	/// # Errors
	/// [`RingError::NotEnoughSpace`] under [`WriteMode::AllOrNone`] when `src` doesn't fit.
	pub fn write(&self, src: &[T], mode: WriteMode) -> Result<usize, RingError> {
		self.inner
			.with_lock_mut(|inner| {
				let available = self.capacity - 1 - occupancy(self.capacity, inner.read_pos, inner.write_pos);
				match mode {
					WriteMode::AllOrNone => {
						if src.len() > available {
							return Err(RingError::NotEnoughSpace {
								requested: src.len(),
								available,
							});
						}
						write_wrapping(&mut inner.data, &mut inner.write_pos, src);
						Ok(src.len())
					}
					WriteMode::Normal => {
						let n = src.len().min(available);
						if n > 0 {
							write_wrapping(&mut inner.data, &mut inner.write_pos, &src[..n]);
						}
						Ok(n)
					}
					WriteMode::Override => {
						let old_occ = occupancy(self.capacity, inner.read_pos, inner.write_pos);
						write_wrapping(&mut inner.data, &mut inner.write_pos, src);
						// Derived from the occupancy delta, not the cursor positions: a write
						// longer than capacity wraps write_pos back near its start.
						let new_occ = (old_occ + src.len()).min(self.capacity - 1);
						inner.read_pos = (inner.write_pos + self.capacity - new_occ) % self.capacity;
						Ok(src.len())
					}
				}
			})
			.expect("ring buffer mutex poisoned")
	}

	/// Reads up to `dst.len()` elements into `dst`, returning how many were read.
	pub fn read(&self, dst: &mut [T]) -> usize {
		self.inner
			.with_lock_mut(|inner| {
				let available = occupancy(self.capacity, inner.read_pos, inner.write_pos);
				let n = dst.len().min(available);
				if n > 0 {
					read_wrapping(&inner.data, &mut inner.read_pos, &mut dst[..n]);
				}
				n
			})
			.expect("ring buffer mutex poisoned")
	}

	/// Number of elements currently available to read.
	#[must_use]
	pub fn available_read(&self) -> usize {
		self.inner
			.with_lock(|inner| occupancy(self.capacity, inner.read_pos, inner.write_pos))
			.expect("ring buffer mutex poisoned")
	}

	/// Number of elements that can be written before the buffer is full.
	#[must_use]
	pub fn available_write(&self) -> usize {
		self.capacity - 1 - self.available_read()
	}

	/// The raw read cursor, for diagnostics.
	#[must_use]
	pub fn read_position(&self) -> usize {
		self.inner.with_lock(|inner| inner.read_pos).expect("ring buffer mutex poisoned")
	}

	/// The raw write cursor, for diagnostics.
	#[must_use]
	pub fn write_position(&self) -> usize {
		self.inner.with_lock(|inner| inner.write_pos).expect("ring buffer mutex poisoned")
	}

	/// Number of complete `scan_width`-wide scans currently available to read, accounting
	/// for a partially-consumed scan already folded into `extra`.
	#[must_use]
	pub fn scans_available(&self) -> usize {
		self.inner
			.with_lock(|inner| {
				let occ = occupancy(self.capacity, inner.read_pos, inner.write_pos);
				(occ + inner.extra) / self.scan_width
			})
			.expect("ring buffer mutex poisoned")
	}

	/// Current count of samples carried over from an in-progress scan.
	#[must_use]
	pub fn extra(&self) -> usize {
		self.inner.with_lock(|inner| inner.extra).expect("ring buffer mutex poisoned")
	}

	/// Sets the count of samples carried over from an in-progress scan.
	///
	/// # Errors
	/// [`RingError::InvalidParameter`] if `extra` isn't less than the scan width.
	pub fn set_extra(&self, extra: usize) -> Result<(), RingError> {
		if extra >= self.scan_width {
			return Err(RingError::InvalidParameter);
		}
		self.inner
			.with_lock_mut(|inner| inner.extra = extra)
			.expect("ring buffer mutex poisoned");
		Ok(())
	}

	/// Drops all buffered data and resets the cursors and carry-over count to empty.
	pub fn reset(&self) {
		self.inner
			.with_lock_mut(|inner| {
				inner.read_pos = 0;
				inner.write_pos = 0;
				inner.extra = 0;
			})
			.expect("ring buffer mutex poisoned");
	}

	/// The configured scan width, in elements.
	#[must_use]
	pub const fn scan_width(&self) -> usize {
		self.scan_width
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_write_and_read() {
		let ring: RingBuffer<u16> = RingBuffer::new(4, 2);
		assert_eq!(ring.write(&[1, 2, 3, 4], WriteMode::Normal).unwrap(), 4);
		let mut out = [0u16; 4];
		assert_eq!(ring.read(&mut out), 4);
		assert_eq!(out, [1, 2, 3, 4]);
		assert_eq!(ring.available_read(), 0);
	}

	#[test]
	fn wraps_the_cursor_around_the_end_of_storage() {
		// scan_count=4, scan_width=2 => S=8, 7 elements usable at a time.
		let ring: RingBuffer<u16> = RingBuffer::new(4, 2);
		let mut sink = [0u16; 6];
		assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6], WriteMode::Normal).unwrap(), 6);
		assert_eq!(ring.read(&mut sink), 6);
		// write_pos has wrapped past the end of the backing vec at least once by now.
		assert_eq!(ring.write(&[7, 8, 9, 10, 11, 12], WriteMode::Normal).unwrap(), 6);
		let mut out = [0u16; 6];
		assert_eq!(ring.read(&mut out), 6);
		assert_eq!(out, [7, 8, 9, 10, 11, 12]);
	}

	#[test]
	fn ring_wrap_across_interleaved_writes_and_reads() {
		// S=10, N=1: write 9, read 5, write 5 more; the reads land exactly on the
		// boundary where the backing storage wraps around.
		let ring: RingBuffer<u16> = RingBuffer::new(10, 1);
		assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9], WriteMode::Normal).unwrap(), 9);
		let mut first = [0u16; 5];
		assert_eq!(ring.read(&mut first), 5);
		assert_eq!(first, [1, 2, 3, 4, 5]);
		assert_eq!(ring.write(&[10, 11, 12, 13, 14], WriteMode::Normal).unwrap(), 5);
		let mut second = [0u16; 5];
		assert_eq!(ring.read(&mut second), 5);
		assert_eq!(second, [6, 7, 8, 9, 10]);
		let mut third = [0u16; 4];
		assert_eq!(ring.read(&mut third), 4);
		assert_eq!(third, [11, 12, 13, 14]);
		assert_eq!(ring.available_read(), 0);
	}

	#[test]
	fn all_or_none_refuses_a_write_that_does_not_fully_fit() {
		let ring: RingBuffer<u16> = RingBuffer::new(2, 2);
		// scan_count=2, scan_width=2 => S=4, 3 elements usable.
		let err = ring.write(&[1, 2, 3, 4, 5], WriteMode::AllOrNone).unwrap_err();
		assert_eq!(err, RingError::NotEnoughSpace { requested: 5, available: 3 });
		assert_eq!(ring.available_read(), 0, "a refused AllOrNone write must leave no partial data");
	}

	#[test]
	fn all_or_none_refusal_leaves_the_write_cursor_untouched() {
		// S=4, N=1, occupancy=2: a 3-element AllOrNone write can't fit in the 1 free slot.
		let ring: RingBuffer<u16> = RingBuffer::new(4, 1);
		ring.write(&[1, 2], WriteMode::Normal).unwrap();
		let write_pos_before = ring.available_write();
		assert_eq!(
			ring.write(&[3, 4, 5], WriteMode::AllOrNone).unwrap_err(),
			RingError::NotEnoughSpace { requested: 3, available: 1 }
		);
		assert_eq!(ring.available_write(), write_pos_before);
	}

	#[test]
	fn normal_mode_truncates_to_whatever_fits() {
		let ring: RingBuffer<u16> = RingBuffer::new(2, 2);
		assert_eq!(ring.write(&[1, 2, 3, 4, 5], WriteMode::Normal).unwrap(), 3);
		assert_eq!(ring.available_read(), 3);
	}

	#[test]
	fn override_mode_keeps_the_newest_elements_when_the_buffer_would_overflow() {
		let ring: RingBuffer<u16> = RingBuffer::new(2, 2);
		// Usable capacity is 3; write 6 elements and expect only the last 3 to survive.
		assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6], WriteMode::Override).unwrap(), 6);
		assert_eq!(ring.available_read(), 3);
		let mut out = [0u16; 3];
		assert_eq!(ring.read(&mut out), 3);
		assert_eq!(out, [4, 5, 6]);
	}

	#[test]
	fn override_mode_pushes_the_read_cursor_past_data_filled_to_capacity() {
		// S=4, N=1: fill to the 3-element usable capacity, then override 3 more.
		let ring: RingBuffer<u16> = RingBuffer::new(4, 1);
		ring.write(&[1, 2, 3], WriteMode::AllOrNone).unwrap();
		assert_eq!(ring.write(&[4, 5, 6], WriteMode::Override).unwrap(), 3);
		let mut out = [0u16; 3];
		assert_eq!(ring.read(&mut out), 3);
		assert_eq!(out, [4, 5, 6]);
	}

	#[test]
	fn scans_available_accounts_for_carried_over_samples() {
		let ring: RingBuffer<u16> = RingBuffer::new(4, 3);
		ring.write(&[1, 2, 3, 4, 5], WriteMode::Normal).unwrap();
		assert_eq!(ring.scans_available(), 1);
		ring.set_extra(2).unwrap();
		assert_eq!(ring.scans_available(), 2);
	}

	#[test]
	fn set_extra_rejects_a_value_not_less_than_scan_width() {
		let ring: RingBuffer<u16> = RingBuffer::new(4, 3);
		assert_eq!(ring.set_extra(3), Err(RingError::InvalidParameter));
		assert_eq!(ring.set_extra(2), Ok(()));
	}

	#[test]
	fn reset_clears_buffered_data_and_carry_over() {
		let ring: RingBuffer<u16> = RingBuffer::new(4, 2);
		ring.write(&[1, 2, 3], WriteMode::Normal).unwrap();
		ring.set_extra(1).unwrap();
		ring.reset();
		assert_eq!(ring.available_read(), 0);
		assert_eq!(ring.extra(), 0);
		assert_eq!(ring.available_write(), ring.scan_width() * 4 - 1);
	}

	#[test]
	fn a_reader_never_observes_more_than_was_ever_written() {
		let ring: RingBuffer<u16> = RingBuffer::new(8, 1);
		let mut total_read = 0usize;
		for batch in 0..20u16 {
			let src: Vec<u16> = (0..5).map(|i| batch * 5 + i).collect();
			ring.write(&src, WriteMode::Normal).unwrap();
			let mut buf = [0u16; 5];
			total_read += ring.read(&mut buf);
		}
		assert!(total_read <= 20 * 5);
	}
}
