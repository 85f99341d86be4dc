pub mod engine;
pub mod qname;
pub mod resource;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{
    ByteCodeLevel, CaptureMode, CompileRequest, ContextItem, Edition, Engine, EngineConfig,
    EngineError, EntryPoint, Executable, Param, Phase, ResultDocument, SourceInput,
    TransformOutput, Transformer, UnitKind, XmlVersion,
};
pub use qname::{QName, XSLT_NAMESPACE};
pub use resource::{InMemoryResourceProvider, ResourceError, ResourceProvider, SharedResourceData};
