#![doc = include_str!("../README.md")]

pub mod classifier;
pub mod compress;
pub mod config;
pub mod error;
pub mod flowtype;
pub mod formats;
pub mod header;
pub mod netflow;
pub mod probe;
pub mod protocol;
pub mod record;
pub mod rwmatch;
pub mod sensor;
pub mod stream;

pub use classifier::{Classifier, ClassifierError, ClassifyError, FileFormat, RecordVersion};
pub use error::FlowpackError;
pub use flowtype::{FlowType, NetworkId};
pub use probe::{Probe, ProbeQuirks, ProbeType};
pub use record::{FlowAddr, FlowRecord, TcpState};
pub use sensor::{Decider, Registry, Sensor};
