use std::fmt::Debug;

use displaydoc::Display;
use ndarray::ArrayD;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::array::ExternalArray;

/// The element type tag of a [`NumericBuffer`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// f32
    F32,
    /// f64
    F64,
    /// i8
    I8,
    /// i16
    I16,
    /// i32
    I32,
    /// i64
    I64,
    /// u8
    U8,
    /// u16
    U16,
    /// u32
    U32,
    /// u64
    U64,
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A scalar which can be stored in a [`NumericBuffer`].
///
/// The trait is sealed, the set of element types is closed. Only some of them have a counterpart
/// in the [`ExternalArray`], see [`ArrayDtype::from_dtype()`].
///
/// [`ArrayDtype::from_dtype()`]: crate::ArrayDtype::from_dtype
pub trait Element:
    sealed::Sealed + Copy + Debug + Default + PartialEq + Send + Sync + 'static
{
    /// The tag of this element type.
    const DTYPE: Dtype;

    #[doc(hidden)]
    fn array(array: &ExternalArray) -> Option<&ArrayD<Self>> {
        let _ = array;
        None
    }

    #[doc(hidden)]
    fn array_mut(array: &mut ExternalArray) -> Option<&mut ArrayD<Self>> {
        let _ = array;
        None
    }
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const DTYPE: Dtype = Dtype::$dtype;
            }
        )*
    };
}

macro_rules! impl_array_element {
    ($($ty:ty => $dtype:ident, $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Element for $ty {
                const DTYPE: Dtype = Dtype::$dtype;

                fn array(array: &ExternalArray) -> Option<&ArrayD<Self>> {
                    match array {
                        ExternalArray::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn array_mut(array: &mut ExternalArray) -> Option<&mut ArrayD<Self>> {
                    match array {
                        ExternalArray::$variant(array) => Some(array),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_array_element!(
    f32 => F32, Float32,
    i32 => I32, Int32,
    i64 => I64, Int64,
    u8 => U8, Uint8,
);

impl_element!(
    f64 => F64,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    u32 => U32,
    u64 => U64,
);

/// The potential errors of a [`NumericBuffer`].
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The shape {shape:?} requires {expected} elements, but got {got}
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        got: usize,
    },
    /// The number of elements of the shape {0:?} overflows
    Overflow(Vec<usize>),
}

/// Computes the number of elements of the shape.
pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        Some(0)
    } else {
        shape
            .iter()
            .try_fold(1_usize, |count, &dim| count.checked_mul(dim))
    }
}

/// A rectangular buffer of a single element type.
///
/// The elements are stored contiguously in row-major order. There is an invariant that the
/// number of elements is equal to the product of all dimensions of the shape.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NumericBuffer<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> NumericBuffer<T> {
    /// Creates a buffer from a shape and its row-major elements.
    ///
    /// # Errors
    /// Fails if the number of elements doesn't match the shape.
    pub fn from_shape_vec(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Result<Self, BufferError> {
        let shape = shape.into();
        let expected = match element_count(&shape) {
            Some(expected) => expected,
            None => return Err(BufferError::Overflow(shape)),
        };
        if data.len() == expected {
            Ok(Self { shape, data })
        } else {
            Err(BufferError::ElementCount {
                shape,
                expected,
                got: data.len(),
            })
        }
    }

    /// Creates a buffer of default values, i.e. zeros for numbers.
    ///
    /// # Errors
    /// Fails if the number of elements of the shape overflows.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Result<Self, BufferError>
    where
        T: Element,
    {
        let shape = shape.into();
        match element_count(&shape) {
            Some(count) => Ok(Self {
                data: vec![T::default(); count],
                shape,
            }),
            None => Err(BufferError::Overflow(shape)),
        }
    }

    /// Gets the shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Gets the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Gets the total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if the buffer contains no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Gets the elements in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Gets the element at the multi-dimensional index.
    ///
    /// Returns `None` if the index has the wrong number of dimensions or is out of bounds.
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.shape.len() {
            return None;
        }

        let mut offset = 0;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.data.get(offset)
    }

    /// Iterates over the rows of a two-dimensional buffer.
    ///
    /// Returns `None` if the buffer isn't two-dimensional.
    pub fn rows(&self) -> Option<impl ExactSizeIterator<Item = &[T]>> {
        if let [rows, cols] = self.shape[..] {
            Some((0..rows).map(move |row| &self.data[row * cols..(row + 1) * cols]))
        } else {
            None
        }
    }

    /// Consumes the buffer and returns the row-major elements.
    pub fn into_raw_vec(self) -> Vec<T> {
        self.data
    }
}

impl<'de, T> Deserialize<'de> for NumericBuffer<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Helper to get a post deserialization invariant check.
        #[derive(Deserialize)]
        struct NumericBufferHelper<T> {
            shape: Vec<usize>,
            data: Vec<T>,
        }

        let helper = NumericBufferHelper::<T>::deserialize(deserializer)?;
        Self::from_shape_vec(helper.shape, helper.data)
            .map_err(<D::Error as serde::de::Error>::custom)
    }
}
