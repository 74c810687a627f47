pub mod bridge;
pub mod builtins;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod error;
pub mod heap;
pub mod invoke;
pub mod managed;
pub mod marshal;
pub mod registry;
pub mod telemetry;

pub use bridge::{Bridge, BridgeBuilder, Target};
pub use catalog::{ConvertContext, ConverterCatalog, TypeConverter};
pub use config::{BridgeConfig, HandleSeed, HeapConfig};
pub use error::{BridgeError, BridgeResult};
pub use heap::{CycleReport, Heap};
pub use invoke::{Candidate, Invoker, ResultMode};
pub use managed::{ClassInfo, ManagedList, ManagedSet, ManagedType, Object};
pub use registry::{ClassDescriptor, MethodDescriptor, TypeRegistry};

pub use xlbind_common::{ObjectHandle, Shape, TaggedValue, XlArray, XlError, XlErrorKind};
