mod registry;

pub use registry::{BroadcastReport, ConnectionHandle, ConnectionRegistry, Frame};
