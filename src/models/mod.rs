pub mod event;

pub use event::{AlertPayload, EventKind, GeoInfo, SshEvent, UNKNOWN};
