//! Meta crate re-exporting the xlbind layers. Depend on this crate and pick
//! layers with feature flags, or depend on the member crates directly when
//! only the host value types are needed.

#[cfg(feature = "common")]
pub use xlbind_common as common;

#[cfg(feature = "core")]
pub use xlbind_core as bridge;

#[cfg(feature = "core")]
pub use xlbind_core::{
    Bridge, BridgeBuilder, BridgeConfig, BridgeError, ClassDescriptor, ClassInfo, CycleReport,
    HandleSeed, Heap, HeapConfig, ManagedType, MethodDescriptor, Object, ResultMode, Target,
    TypeConverter,
};

#[cfg(feature = "common")]
pub use xlbind_common::{ObjectHandle, Shape, TaggedValue, XlArray, XlError, XlErrorKind};
