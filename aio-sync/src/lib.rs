//! Mutex-locking helpers used throughout the acquisition crates so that call sites read as
//! a single expression instead of an explicit `lock()`/`drop(guard)` pair.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

pub trait LockExt<'a, T, Guard>
where
	T: ?Sized + 'a,
{
	///
	/// # Errors
	/// - [`PoisonError`]
	///
	fn with_lock<O, Op: FnOnce(&T) -> O>(
		&'a self,
		op: Op,
	) -> Result<O, PoisonError<MutexGuard<'a, T>>>;

	///
	/// # Errors
	/// - [`PoisonError`]
	///
	fn with_lock_mut<O, Op: FnOnce(&mut T) -> O>(
		&'a self,
		op: Op,
	) -> Result<O, PoisonError<MutexGuard<'a, T>>>;
}

impl<'a, T> LockExt<'a, T, MutexGuard<'a, T>> for Mutex<T>
where
	T: ?Sized + 'a,
{
	fn with_lock<O, Op: for<'b> FnOnce(&'b T) -> O>(
		&'a self,
		op: Op,
	) -> Result<O, PoisonError<MutexGuard<'a, T>>> {
		let guard = self.lock()?;
		let output = op(&guard);
		drop(guard);
		Ok(output)
	}

	fn with_lock_mut<O, Op: for<'b> FnOnce(&'b mut T) -> O>(
		&'a self,
		op: Op,
	) -> Result<O, PoisonError<MutexGuard<'a, T>>> {
		let mut guard = self.lock()?;
		let output = op(&mut guard);
		drop(guard);
		Ok(output)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn with_lock_runs_closure_and_releases() {
		let m = Mutex::new(3);
		let doubled = m.with_lock(|v| v * 2).unwrap();
		assert_eq!(doubled, 6);
		assert_eq!(*m.lock().unwrap(), 3);
	}

	#[test]
	fn with_lock_mut_mutates_in_place() {
		let m = Mutex::new(vec![1, 2]);
		m.with_lock_mut(|v| v.push(3)).unwrap();
		assert_eq!(*m.lock().unwrap(), vec![1, 2, 3]);
	}
}
