//! Host memory buffers.
//!
//! A [`MemoryBuffer`] is a contiguous block of `len` elements of one
//! storable [`ScalarKind`]. It either owns its storage exclusively or
//! borrows storage that an outside collaborator (a mesh reader, a geometry
//! generator) already holds, so imported fields are wrapped without a copy.
//!
//! ```text
//! owned:     MemoryBuffer ──owns──▶ RwLock<HostData>
//! borrowed:  MemoryBuffer ──Arc───▶ RwLock<HostData> ◀──Arc── external owner
//! ```
//!
//! Owned buffers can be resized, which discards their contents and
//! reallocates. Borrowed buffers refuse to resize with
//! [`UsageError::ResizeBorrowed`] and leave the owner's storage untouched.
//!
//! Buffers are shared by expression graphs and solvers through
//! [`BufferRef`]. The locks order host access only; they do not prevent two
//! queued kernels from writing the same buffer, which remains a caller
//! obligation.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::UsageError;
use crate::ids::BufferId;
use crate::scalar::{Element, Precision, ScalarKind, ScalarValue};

/// Shared handle to a buffer.
pub type BufferRef = Arc<MemoryBuffer>;

/// Externally owned storage that can be wrapped by [`MemoryBuffer::borrowed`].
pub type SharedHostData = Arc<RwLock<HostData>>;

/// Type-erased element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl HostData {
    /// Zero-filled storage of `len` elements.
    pub fn zeroed(kind: ScalarKind, len: usize) -> Result<Self, UsageError> {
        Ok(match kind {
            ScalarKind::Int => HostData::Int(vec![0; len]),
            ScalarKind::UInt => HostData::UInt(vec![0; len]),
            ScalarKind::Long => HostData::Long(vec![0; len]),
            ScalarKind::Float => HostData::Float(vec![0.0; len]),
            ScalarKind::Double => HostData::Double(vec![0.0; len]),
            ScalarKind::Bool | ScalarKind::Real => {
                return Err(UsageError::UnsupportedBufferKind { kind });
            }
        })
    }

    /// Wrap a typed vector into shared storage for [`MemoryBuffer::borrowed`].
    pub fn shared<T: Element>(data: Vec<T>) -> SharedHostData {
        Arc::new(RwLock::new(T::wrap(data)))
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            HostData::Int(_) => ScalarKind::Int,
            HostData::UInt(_) => ScalarKind::UInt,
            HostData::Long(_) => ScalarKind::Long,
            HostData::Float(_) => ScalarKind::Float,
            HostData::Double(_) => ScalarKind::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::Int(v) => v.len(),
            HostData::UInt(v) => v.len(),
            HostData::Long(v) => v.len(),
            HostData::Float(v) => v.len(),
            HostData::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes, for device upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HostData::Int(v) => bytemuck::cast_slice(v),
            HostData::UInt(v) => bytemuck::cast_slice(v),
            HostData::Long(v) => bytemuck::cast_slice(v),
            HostData::Float(v) => bytemuck::cast_slice(v),
            HostData::Double(v) => bytemuck::cast_slice(v),
        }
    }

    /// Overwrite from raw bytes of identical length. Returns `false` on a
    /// length mismatch, leaving the contents unchanged.
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> bool {
        let target: &mut [u8] = match self {
            HostData::Int(v) => bytemuck::cast_slice_mut(v),
            HostData::UInt(v) => bytemuck::cast_slice_mut(v),
            HostData::Long(v) => bytemuck::cast_slice_mut(v),
            HostData::Float(v) => bytemuck::cast_slice_mut(v),
            HostData::Double(v) => bytemuck::cast_slice_mut(v),
        };
        if target.len() != bytes.len() {
            return false;
        }
        target.copy_from_slice(bytes);
        true
    }

    /// Element `index` as a host value.
    pub fn load(&self, index: usize) -> Option<ScalarValue> {
        match self {
            HostData::Int(v) => v.get(index).map(|&x| ScalarValue::Int(i64::from(x))),
            HostData::UInt(v) => v.get(index).map(|&x| ScalarValue::Int(i64::from(x))),
            HostData::Long(v) => v.get(index).map(|&x| ScalarValue::Int(x)),
            HostData::Float(v) => v.get(index).map(|&x| ScalarValue::Float(f64::from(x))),
            HostData::Double(v) => v.get(index).map(|&x| ScalarValue::Float(x)),
        }
    }

    /// Store `value` at `index`, converting to the storage kind. Returns
    /// `false` if `index` is out of range.
    pub fn store(&mut self, index: usize, value: ScalarValue) -> bool {
        macro_rules! put {
            ($v:expr, $x:expr) => {
                match $v.get_mut(index) {
                    Some(slot) => {
                        *slot = $x;
                        true
                    }
                    None => false,
                }
            };
        }
        match self {
            HostData::Int(v) => put!(v, value.as_i64() as i32),
            HostData::UInt(v) => put!(v, value.as_i64() as u32),
            HostData::Long(v) => put!(v, value.as_i64()),
            HostData::Float(v) => put!(v, value.as_f64() as f32),
            HostData::Double(v) => put!(v, value.as_f64()),
        }
    }
}

/// Exclusive element access to a buffer.
///
/// Stores go through [`store`](Self::store) and the typed or byte copies,
/// so the length and kind of the storage never change while it is held.
pub struct BufferWriteGuard<'a>(RwLockWriteGuard<'a, HostData>);

impl BufferWriteGuard<'_> {
    /// See [`HostData::store`].
    pub fn store(&mut self, index: usize, value: ScalarValue) -> bool {
        self.0.store(index, value)
    }

    /// See [`HostData::copy_from_bytes`].
    pub fn copy_from_bytes(&mut self, bytes: &[u8]) -> bool {
        self.0.copy_from_bytes(bytes)
    }

    /// Mutable typed view, `None` if the storage holds another kind.
    pub fn as_mut_slice<T: Element>(&mut self) -> Option<&mut [T]> {
        T::slice_mut(&mut self.0)
    }
}

impl Deref for BufferWriteGuard<'_> {
    type Target = HostData;

    fn deref(&self) -> &HostData {
        &self.0
    }
}

enum Storage {
    Owned(RwLock<HostData>),
    Borrowed(SharedHostData),
}

/// Owned-or-borrowed block of typed memory.
pub struct MemoryBuffer {
    id: BufferId,
    kind: ScalarKind,
    storage: Storage,
}

impl MemoryBuffer {
    /// Allocate a zero-filled owned buffer.
    pub fn new(kind: ScalarKind, len: usize) -> Result<BufferRef, UsageError> {
        let data = HostData::zeroed(kind, len)?;
        Ok(Self::owned(data))
    }

    /// Take ownership of `data`.
    pub fn from_vec<T: Element>(data: Vec<T>) -> BufferRef {
        Self::owned(T::wrap(data))
    }

    /// Wrap externally owned storage. The buffer never frees or resizes it,
    /// and the owner must keep its kind and length while the buffer is bound
    /// to a kernel.
    pub fn borrowed(shared: SharedHostData) -> BufferRef {
        let kind = shared.read().kind();
        Arc::new(Self {
            id: BufferId::next(),
            kind,
            storage: Storage::Borrowed(shared),
        })
    }

    fn owned(data: HostData) -> BufferRef {
        Arc::new(Self {
            id: BufferId::next(),
            kind: data.kind(),
            storage: Storage::Owned(RwLock::new(data)),
        })
    }

    fn cell(&self) -> &RwLock<HostData> {
        match &self.storage {
            Storage::Owned(cell) => cell,
            Storage::Borrowed(shared) => shared,
        }
    }

    /// Process-unique identity, used to deduplicate kernel arguments.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Element kind, fixed at construction.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Current number of elements.
    pub fn len(&self) -> usize {
        self.cell().read().len()
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the storage belongs to an outside owner.
    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_))
    }

    /// Reallocate an owned buffer to `len` zeroed elements.
    ///
    /// # Errors
    ///
    /// [`UsageError::ResizeBorrowed`] for borrowed buffers.
    pub fn resize(&self, len: usize) -> Result<(), UsageError> {
        match &self.storage {
            Storage::Owned(cell) => {
                let mut data = cell.write();
                *data = HostData::zeroed(self.kind, len)?;
                Ok(())
            }
            Storage::Borrowed(_) => Err(UsageError::ResizeBorrowed { buffer: self.id }),
        }
    }

    /// Shared host access.
    pub fn read(&self) -> RwLockReadGuard<'_, HostData> {
        self.cell().read()
    }

    /// Exclusive element access. Use [`resize`](Self::resize) to change
    /// the length of an owned buffer.
    pub fn write(&self) -> BufferWriteGuard<'_> {
        BufferWriteGuard(self.cell().write())
    }

    /// Copy the contents out as `T`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, UsageError> {
        let data = self.read();
        T::slice(&data)
            .map(<[T]>::to_vec)
            .ok_or(UsageError::KindMismatch {
                buffer: self.id,
                requested: T::KIND,
                actual: self.kind,
            })
    }

    /// Overwrite the contents from a slice of equal length.
    pub fn copy_from_slice<T: Element>(&self, values: &[T]) -> Result<(), UsageError> {
        let mut data = self.write();
        let len = data.len();
        let target = data.as_mut_slice::<T>().ok_or(UsageError::KindMismatch {
            buffer: self.id,
            requested: T::KIND,
            actual: self.kind,
        })?;
        if len != values.len() {
            return Err(UsageError::LengthMismatch {
                buffer: self.id,
                len,
                provided: values.len(),
            });
        }
        target.copy_from_slice(values);
        Ok(())
    }

    /// Overwrite the contents from device bytes.
    pub fn copy_from_bytes(&self, bytes: &[u8]) -> Result<(), UsageError> {
        let mut data = self.write();
        let len = data.len();
        if data.copy_from_bytes(bytes) {
            Ok(())
        } else {
            Err(UsageError::LengthMismatch {
                buffer: self.id,
                len,
                provided: bytes.len() / self.kind.size_bytes(Precision::Single),
            })
        }
    }
}

impl std::fmt::Debug for MemoryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBuffer")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("borrowed", &self.is_borrowed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_buffer_resizes() {
        let buf = MemoryBuffer::from_vec(vec![1.0f32, 2.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_borrowed());

        buf.resize(5).unwrap();
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.to_vec::<f32>().unwrap(), vec![0.0; 5]);
    }

    #[test]
    fn borrowed_resize_fails_without_touching_owner() {
        let shared = HostData::shared(vec![4.0f64, 5.0, 6.0]);
        let buf = MemoryBuffer::borrowed(Arc::clone(&shared));
        assert!(buf.is_borrowed());
        assert_eq!(buf.kind(), ScalarKind::Double);

        let err = buf.resize(10).unwrap_err();
        assert_eq!(err, UsageError::ResizeBorrowed { buffer: buf.id() });

        assert_eq!(*shared.read(), HostData::Double(vec![4.0, 5.0, 6.0]));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn borrowed_writes_are_visible_to_owner() {
        let shared = HostData::shared(vec![0i32; 4]);
        let buf = MemoryBuffer::borrowed(Arc::clone(&shared));

        buf.copy_from_slice(&[1, 2, 3, 4]).unwrap();
        assert_eq!(*shared.read(), HostData::Int(vec![1, 2, 3, 4]));

        drop(buf);
        assert_eq!(shared.read().len(), 4);
    }

    #[test]
    fn typed_access_checks_kind() {
        let buf = MemoryBuffer::new(ScalarKind::UInt, 2).unwrap();
        let err = buf.to_vec::<f32>().unwrap_err();
        assert!(matches!(err, UsageError::KindMismatch { requested: ScalarKind::Float, .. }));

        let err = buf.copy_from_slice(&[1u32, 2, 3]).unwrap_err();
        assert!(matches!(err, UsageError::LengthMismatch { len: 2, provided: 3, .. }));
    }

    #[test]
    fn bool_and_real_are_not_storable() {
        assert!(MemoryBuffer::new(ScalarKind::Bool, 1).is_err());
        assert!(MemoryBuffer::new(ScalarKind::Real, 1).is_err());
    }

    #[test]
    fn byte_round_trip_through_host_data() {
        let buf = MemoryBuffer::from_vec(vec![1.5f32, -2.0]);
        let bytes = buf.read().as_bytes().to_vec();

        let other = MemoryBuffer::new(ScalarKind::Float, 2).unwrap();
        other.copy_from_bytes(&bytes).unwrap();
        assert_eq!(other.to_vec::<f32>().unwrap(), vec![1.5, -2.0]);

        assert!(other.copy_from_bytes(&bytes[..4]).is_err());
    }

    #[test]
    fn load_and_store_convert() {
        let mut data = HostData::zeroed(ScalarKind::Int, 2).unwrap();
        assert!(data.store(1, ScalarValue::Float(7.8)));
        assert!(!data.store(2, ScalarValue::Int(1)));
        assert_eq!(data.load(1), Some(ScalarValue::Int(7)));
        assert_eq!(data.load(2), None);
    }

    #[test]
    fn borrowed_length_is_fixed_through_every_accessor() {
        let shared = HostData::shared(vec![1i32, 2, 3]);
        let buf = MemoryBuffer::borrowed(Arc::clone(&shared));

        {
            let mut data = buf.write();
            assert!(data.store(2, ScalarValue::Int(9)));
            assert!(!data.store(3, ScalarValue::Int(9)));
            assert!(!data.copy_from_bytes(&[0u8; 16]));
            assert!(data.as_mut_slice::<f32>().is_none());
            assert_eq!(data.as_mut_slice::<i32>().map(|s| s.len()), Some(3));
        }
        assert!(buf.copy_from_slice(&[0i32; 5]).is_err());
        assert!(buf.resize(5).is_err());

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.kind(), ScalarKind::Int);
        assert_eq!(*shared.read(), HostData::Int(vec![1, 2, 9]));
    }
}
