//! Collapses a packet of raw counts, laid out as repeating groups of `1 + oversample`
//! hardware replicas per logical sample, down to one integer-mean sample per group.

/// Averages each `(1 + oversample)`-sized group of `samples` in place, writing the
/// resulting means into the slice's prefix, and returns the number of groups produced
/// (`floor(samples.len() / (oversample + 1))`).
///
/// When `discard_first` is set, the first element of each group (the un-oversampled
/// original reading) is excluded from the mean.
#[must_use]
pub fn cull_and_average(samples: &mut [u16], oversample: u8, discard_first: bool) -> usize {
	let group_size = usize::from(oversample) + 1;
	let n_groups = samples.len() / group_size;
	let skip = usize::from(discard_first);
	// A group of size 1 with discard_first set has nothing left to average; fall back to
	// keeping the lone sample rather than dividing by zero.
	let divisor = (group_size - skip).max(1) as u32;

	for group in 0..n_groups {
		let base = group * group_size;
		let sum: u32 = samples[base + skip..base + group_size]
			.iter()
			.map(|&v| u32::from(v))
			.sum();
		samples[group] = (sum / divisor) as u16;
	}

	n_groups
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn averages_two_groups_of_four() {
		let mut samples = [10, 12, 14, 16, 20, 22, 24, 26];
		let n = cull_and_average(&mut samples, 3, false);
		assert_eq!(n, 2);
		assert_eq!(&samples[..n], &[13, 23]);
	}

	#[test]
	fn no_oversample_is_a_pass_through() {
		let mut samples = [1, 2, 3, 4];
		let n = cull_and_average(&mut samples, 0, false);
		assert_eq!(n, 4);
		assert_eq!(&samples[..n], &[1, 2, 3, 4]);
	}

	#[test]
	fn discards_the_first_sample_of_each_group() {
		let mut samples = [100, 10, 20, 30, 200, 40, 50, 60];
		let n = cull_and_average(&mut samples, 3, true);
		assert_eq!(n, 2);
		// mean of [10,20,30] = 20, mean of [40,50,60] = 50
		assert_eq!(&samples[..n], &[20, 50]);
	}

	#[test]
	fn drops_a_trailing_partial_group() {
		let mut samples = [10, 20, 30, 40, 5];
		let n = cull_and_average(&mut samples, 1, false);
		assert_eq!(n, 2);
		assert_eq!(&samples[..n], &[15, 35]);
	}

	#[test]
	fn empty_input_yields_no_groups() {
		let mut samples: [u16; 0] = [];
		assert_eq!(cull_and_average(&mut samples, 3, false), 0);
	}
}
