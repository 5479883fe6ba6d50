//! Convoy Core — work items, conversion kinds, and the remote conversion contract.

pub mod response;
pub mod transform;
pub mod work;

pub use response::{parse_xml_number, trim_xml_response};
pub use transform::{reference_conversion, RemoteTransform, TransformError};
pub use work::{Converted, TransformKind, UnknownTransformKind, WorkItem};
