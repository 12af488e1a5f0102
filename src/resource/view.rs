//! Derived read-only views over cached resources.

// std
use std::fmt::{self, Debug, Formatter};
// self
use crate::{
	_prelude::*,
	resource::descriptor::{CachedResource, Resource},
};

type Transform<I, O> = dyn Fn(I) -> O + Send + Sync;

/// Transformation layered over another resource.
///
/// A view owns no cache line: reading it reads the underlying cached resource and applies the
/// transform on every read, and clearing it clears the underlying entry.
pub struct View<R, U>
where
	R: Resource,
{
	underlying: R,
	transform: Arc<Transform<R::Output, U>>,
}
impl<R, U> View<R, U>
where
	R: Resource,
{
	/// Layer `transform` over `underlying`.
	pub fn new<F>(underlying: R, transform: F) -> Self
	where
		F: Fn(R::Output) -> U + Send + Sync + 'static,
	{
		Self { underlying, transform: Arc::new(transform) }
	}

	/// The resource this view reads from.
	pub fn underlying(&self) -> &R {
		&self.underlying
	}
}
impl<R, U> Clone for View<R, U>
where
	R: Resource,
{
	fn clone(&self) -> Self {
		Self { underlying: self.underlying.clone(), transform: self.transform.clone() }
	}
}
impl<R, U> Debug for View<R, U>
where
	R: Resource + Debug,
{
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("View").field("underlying", &self.underlying).finish_non_exhaustive()
	}
}
impl<R, U> Resource for View<R, U>
where
	R: Resource,
	U: 'static,
{
	type Output = U;
	type Source = R::Source;

	fn source(&self) -> &Self::Source {
		self.underlying.source()
	}

	fn project(&self, value: <Self::Source as CachedResource>::Value) -> U {
		(self.transform)(self.underlying.project(value))
	}
}

/// Combinators for building views.
pub trait ResourceExt: Resource + Sized {
	/// Apply an arbitrary transform to the resource's output.
	fn view<U, F>(self, transform: F) -> View<Self, U>
	where
		F: Fn(Self::Output) -> U + Send + Sync + 'static,
	{
		View::new(self, transform)
	}

	/// Transform each element of a collection-valued resource.
	fn map<T, U, F>(self, transform: F) -> View<Self, Vec<U>>
	where
		Self::Output: IntoIterator<Item = T>,
		F: Fn(T) -> U + Send + Sync + 'static,
	{
		View::new(self, move |items: Self::Output| items.into_iter().map(&transform).collect())
	}

	/// Keep the elements of a collection-valued resource matching `predicate`.
	fn filter<T, P>(self, predicate: P) -> View<Self, Vec<T>>
	where
		Self::Output: IntoIterator<Item = T>,
		P: Fn(&T) -> bool + Send + Sync + 'static,
	{
		View::new(self, move |items: Self::Output| items.into_iter().filter(&predicate).collect())
	}

	/// First element of a collection-valued resource matching `predicate`.
	fn find<T, P>(self, predicate: P) -> View<Self, Option<T>>
	where
		Self::Output: IntoIterator<Item = T>,
		P: Fn(&T) -> bool + Send + Sync + 'static,
	{
		View::new(self, move |items: Self::Output| items.into_iter().find(&predicate))
	}
}
impl<R> ResourceExt for R where R: Resource {}
