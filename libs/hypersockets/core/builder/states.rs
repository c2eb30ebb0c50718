/// Type-state markers for the builder pattern
///
/// These types track which required fields have been set in the builder
/// at compile-time, preventing invalid configurations.
use std::marker::PhantomData;

/// Marker trait for URL state
pub trait UrlState {}

/// URL has not been set
pub struct NoUrl;
impl UrlState for NoUrl {}

/// URL has been set
pub struct HasUrl;
impl UrlState for HasUrl {}

/// Marker trait for room codec state
pub trait CodecState {}

/// Codec has not been set
pub struct NoCodec;
impl CodecState for NoCodec {}

/// Codec has been set
pub struct HasCodec;
impl CodecState for HasCodec {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<U, C> {
    _url: PhantomData<U>,
    _codec: PhantomData<C>,
}

impl<U, C> TypeState<U, C> {
    pub(crate) fn new() -> Self {
        Self {
            _url: PhantomData,
            _codec: PhantomData,
        }
    }
}
