//! The numeric arrays exchanged with the tokenizer backend.

use std::convert::TryFrom;

use derive_more::From;
use displaydoc::Display;
use ndarray::{ArrayD, IxDyn};
use thiserror::Error;

use crate::buffer::{BufferError, Dtype, Element, NumericBuffer};

/// The element type tag of an [`ExternalArray`].
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum ArrayDtype {
    /// float32
    Float32,
    /// int32
    Int32,
    /// int64
    Int64,
    /// uint8
    Uint8,
}

/// The element type {0} has no array counterpart
#[derive(Clone, Copy, Debug, Display, Error, PartialEq, Eq)]
pub struct UnsupportedDtypeError(pub Dtype);

/// The potential errors of converting between buffers and arrays.
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ConversionError {
    /// {0}
    UnsupportedDtype(#[from] UnsupportedDtypeError),
    /// Expected an array of {expected}, but got {found}
    DtypeMismatch {
        expected: ArrayDtype,
        found: ArrayDtype,
    },
    /// An array of {from} can't be represented as {to} without loss
    Lossy { from: ArrayDtype, to: Dtype },
    /// Expected {expected} elements, but got {got}
    Length { expected: usize, got: usize },
    /// Invalid buffer: {0}
    Buffer(#[from] BufferError),
    /// The shape {0:?} is too large for an array
    Shape(Vec<usize>),
}

impl ArrayDtype {
    /// Looks up the array counterpart of the local element type.
    ///
    /// The mapping is a closed table: `f32`, `i32`, `i64` and `u8` map to `float32`, `int32`,
    /// `int64` and `uint8`, all other element types are unsupported.
    pub fn from_dtype(dtype: Dtype) -> Result<Self, UnsupportedDtypeError> {
        match dtype {
            Dtype::F32 => Ok(Self::Float32),
            Dtype::I32 => Ok(Self::Int32),
            Dtype::I64 => Ok(Self::Int64),
            Dtype::U8 => Ok(Self::Uint8),
            Dtype::F64 | Dtype::I8 | Dtype::I16 | Dtype::U16 | Dtype::U32 | Dtype::U64 => {
                Err(UnsupportedDtypeError(dtype))
            }
        }
    }

    /// Gets the local element type of this array element type.
    pub fn dtype(self) -> Dtype {
        match self {
            Self::Float32 => Dtype::F32,
            Self::Int32 => Dtype::I32,
            Self::Int64 => Dtype::I64,
            Self::Uint8 => Dtype::U8,
        }
    }
}

impl TryFrom<Dtype> for ArrayDtype {
    type Error = UnsupportedDtypeError;

    fn try_from(dtype: Dtype) -> Result<Self, Self::Error> {
        Self::from_dtype(dtype)
    }
}

/// A dynamically shaped array tagged with its element type.
///
/// This is the representation the tokenizer backend consumes and produces. Arrays are transient,
/// they are created for a single call and not retained afterwards.
#[derive(Clone, Debug, From, PartialEq)]
pub enum ExternalArray {
    Float32(ArrayD<f32>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Uint8(ArrayD<u8>),
}

impl ExternalArray {
    /// Allocates a zero-initialized array of the shape and element type.
    ///
    /// # Errors
    /// Fails if the product of the non-zero dimensions doesn't fit into an `isize`.
    pub fn zeros(shape: &[usize], dtype: ArrayDtype) -> Result<Self, ConversionError> {
        let fits = shape
            .iter()
            .filter(|&&dim| dim != 0)
            .try_fold(1_usize, |count, &dim| count.checked_mul(dim))
            .map_or(false, |count| count <= isize::MAX as usize);
        if !fits {
            return Err(ConversionError::Shape(shape.to_vec()));
        }

        let shape = IxDyn(shape);
        Ok(match dtype {
            ArrayDtype::Float32 => ArrayD::<f32>::zeros(shape).into(),
            ArrayDtype::Int32 => ArrayD::<i32>::zeros(shape).into(),
            ArrayDtype::Int64 => ArrayD::<i64>::zeros(shape).into(),
            ArrayDtype::Uint8 => ArrayD::<u8>::zeros(shape).into(),
        })
    }

    /// Gets the element type.
    pub fn dtype(&self) -> ArrayDtype {
        match self {
            Self::Float32(_) => ArrayDtype::Float32,
            Self::Int32(_) => ArrayDtype::Int32,
            Self::Int64(_) => ArrayDtype::Int64,
            Self::Uint8(_) => ArrayDtype::Uint8,
        }
    }

    /// Gets the shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float32(array) => array.shape(),
            Self::Int32(array) => array.shape(),
            Self::Int64(array) => array.shape(),
            Self::Uint8(array) => array.shape(),
        }
    }

    /// Gets the total number of elements.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    /// Checks if the array contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets a typed view of the underlying memory.
    ///
    /// Returns `None` if `T` doesn't match the element type or if the array isn't contiguous in
    /// row-major order.
    pub fn view<T: Element>(&self) -> Option<&[T]> {
        T::array(self)?.as_slice()
    }

    /// Gets a mutable typed view of the underlying memory.
    ///
    /// Returns `None` under the same conditions as [`view()`](Self::view).
    pub fn view_mut<T: Element>(&mut self) -> Option<&mut [T]> {
        T::array_mut(self)?.as_slice_mut()
    }

    /// Copies a buffer into a new array of the same shape.
    ///
    /// # Errors
    /// Fails if the element type of the buffer isn't supported. This is checked before anything
    /// is allocated.
    pub fn from_buffer<T: Element>(buffer: &NumericBuffer<T>) -> Result<Self, ConversionError> {
        let dtype = ArrayDtype::from_dtype(T::DTYPE)?;
        let mut array = Self::zeros(buffer.shape(), dtype)?;

        let found = array.dtype();
        let view = array
            .view_mut::<T>()
            .ok_or(ConversionError::DtypeMismatch {
                expected: dtype,
                found,
            })?;
        if view.len() != buffer.len() {
            return Err(ConversionError::Length {
                expected: view.len(),
                got: buffer.len(),
            });
        }
        view.copy_from_slice(buffer.as_slice());

        Ok(array)
    }

    /// Copies the array into a new buffer of the same shape.
    ///
    /// The elements are copied in logical row-major order, independent of the memory layout.
    ///
    /// # Errors
    /// Fails if the element type of the buffer isn't supported or doesn't match the array.
    pub fn to_buffer<T: Element>(&self) -> Result<NumericBuffer<T>, ConversionError> {
        let expected = ArrayDtype::from_dtype(T::DTYPE)?;
        let array = T::array(self).ok_or(ConversionError::DtypeMismatch {
            expected,
            found: self.dtype(),
        })?;
        let data = array.iter().copied().collect();

        NumericBuffer::from_shape_vec(array.shape(), data).map_err(Into::into)
    }

    /// Copies the array into a new buffer of `i64`s.
    ///
    /// Integer arrays are widened, which is lossless for all integer element types.
    ///
    /// # Errors
    /// Fails for floating point arrays.
    pub fn to_i64_buffer(&self) -> Result<NumericBuffer<i64>, ConversionError> {
        let data: Vec<i64> = match self {
            Self::Int64(array) => array.iter().copied().collect(),
            Self::Int32(array) => array.iter().copied().map(i64::from).collect(),
            Self::Uint8(array) => array.iter().copied().map(i64::from).collect(),
            Self::Float32(_) => {
                return Err(ConversionError::Lossy {
                    from: ArrayDtype::Float32,
                    to: Dtype::I64,
                });
            }
        };

        NumericBuffer::from_shape_vec(self.shape(), data).map_err(Into::into)
    }
}

impl<T: Element> TryFrom<&NumericBuffer<T>> for ExternalArray {
    type Error = ConversionError;

    fn try_from(buffer: &NumericBuffer<T>) -> Result<Self, Self::Error> {
        Self::from_buffer(buffer)
    }
}

impl<T: Element> TryFrom<&ExternalArray> for NumericBuffer<T> {
    type Error = ConversionError;

    fn try_from(array: &ExternalArray) -> Result<Self, Self::Error> {
        array.to_buffer()
    }
}
