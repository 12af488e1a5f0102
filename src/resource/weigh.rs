//! Weight model used by the pruner to budget cache size.

// std
use std::{
	collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
	rc::Rc,
};
// self
use crate::_prelude::*;

/// Units a cached value contributes toward the cache's weight budget.
///
/// Collections weigh one unit per element so a few large listings dominate eviction; everything
/// else weighs a single unit. Implement with an empty body to opt a custom type into the default.
pub trait Weigh {
	/// Weight of this value.
	fn weight(&self) -> u64 {
		1
	}
}

macro_rules! impl_unit_weight {
	($($ty:ty),* $(,)?) => {
		$(impl Weigh for $ty {})*
	};
}

macro_rules! impl_len_weight {
	($($ty:ident<$($param:ident),+>),* $(,)?) => {
		$(
			impl<$($param),+> Weigh for $ty<$($param),+> {
				fn weight(&self) -> u64 {
					self.len() as u64
				}
			}
		)*
	};
}

impl_unit_weight!(
	(),
	bool,
	char,
	u8,
	u16,
	u32,
	u64,
	u128,
	usize,
	i8,
	i16,
	i32,
	i64,
	i128,
	isize,
	f32,
	f64,
	str,
	String,
	&'static str,
);

impl_len_weight!(Vec<T>, VecDeque<T>, HashSet<T, S>, BTreeSet<T>, HashMap<K, V, S>, BTreeMap<K, V>);

impl<T> Weigh for [T] {
	fn weight(&self) -> u64 {
		self.len() as u64
	}
}

impl<T, const N: usize> Weigh for [T; N] {
	fn weight(&self) -> u64 {
		N as u64
	}
}

impl<T> Weigh for Option<T>
where
	T: Weigh,
{
	fn weight(&self) -> u64 {
		self.as_ref().map_or(1, Weigh::weight)
	}
}

impl<T> Weigh for Box<T>
where
	T: Weigh + ?Sized,
{
	fn weight(&self) -> u64 {
		(**self).weight()
	}
}

impl<T> Weigh for Arc<T>
where
	T: Weigh + ?Sized,
{
	fn weight(&self) -> u64 {
		(**self).weight()
	}
}

impl<T> Weigh for Rc<T>
where
	T: Weigh + ?Sized,
{
	fn weight(&self) -> u64 {
		(**self).weight()
	}
}
