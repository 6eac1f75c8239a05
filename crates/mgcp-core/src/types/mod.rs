//! MGCP protocol value types

pub mod endpoint_id;
pub mod event;
pub mod mode;
pub mod options;
pub mod parameter;
pub mod return_code;
pub mod verb;

pub use endpoint_id::{EndpointId, Wildcard};
pub use event::{parse_parameter_pairs, EventAction, EventName, ObservedEvent, RequestedEvent, SignalRequest};
pub use mode::ConnectionMode;
pub use options::LocalConnectionOptions;
pub use parameter::{ParameterName, Parameters};
pub use return_code::ReturnCode;
pub use verb::{TransactionId, Verb};
