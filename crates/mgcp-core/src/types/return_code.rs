//! # MGCP Return Codes
//!
//! Response codes from RFC 3435 Section 2.4. Codes are grouped by class:
//!
//! - `1xx` provisional
//! - `2xx` success
//! - `4xx` transient failure, the call agent may retry
//! - `5xx` permanent failure

use std::fmt;

use serde::{Deserialize, Serialize};

/// RFC 3435 response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnCode {
    /// 100 - transaction is being executed, final response follows
    TransactionBeingExecuted,
    /// 101 - transaction has been queued
    TransactionQueued,
    /// 200 - transaction executed normally
    TransactionExecuted,
    /// 250 - connection was deleted
    ConnectionDeleted,
    /// 400 - transient error
    TransientError,
    /// 401 - phone already off hook
    PhoneOffHook,
    /// 402 - phone already on hook
    PhoneOnHook,
    /// 403 - insufficient resources available now
    InsufficientResourcesNow,
    /// 404 - insufficient bandwidth now
    InsufficientBandwidthNow,
    /// 405 - endpoint is restarting
    EndpointRestarting,
    /// 406 - transaction timeout
    TransactionTimeout,
    /// 407 - transaction aborted
    TransactionAborted,
    /// 409 - internal overload
    InternalOverload,
    /// 410 - no endpoint available
    NoEndpointAvailable,
    /// 500 - endpoint unknown
    EndpointUnknown,
    /// 501 - endpoint not ready
    EndpointNotReady,
    /// 502 - endpoint does not have sufficient resources
    EndpointInsufficientResources,
    /// 503 - "all of" wildcard too complicated
    WildcardTooComplicated,
    /// 504 - unknown or unsupported command
    UnknownCommand,
    /// 505 - unsupported remote connection descriptor
    UnsupportedRemoteDescriptor,
    /// 506 - unable to satisfy both local connection options and remote descriptor
    UnableToSatisfyOptions,
    /// 507 - unsupported functionality
    UnsupportedFunctionality,
    /// 510 - protocol error
    ProtocolError,
    /// 511 - unrecognized extension
    UnrecognizedExtension,
    /// 515 - incorrect connection id
    IncorrectConnectionId,
    /// 516 - unknown or incorrect call id
    IncorrectCallId,
    /// 517 - unsupported or invalid mode
    UnsupportedMode,
    /// 518 - unsupported or unknown package
    UnsupportedPackage,
    /// 522 - no such event or signal
    NoSuchEventOrSignal,
    /// 524 - internal inconsistency in local connection options
    InconsistentLocalOptions,
    /// 527 - missing remote connection descriptor
    MissingRemoteDescriptor,
    /// 528 - incompatible protocol version
    IncompatibleProtocolVersion,
    /// 529 - internal hardware failure
    InternalHardwareFailure,
    /// 532 - unsupported value in local connection options
    UnsupportedLocalOptionValue,
    /// 538 - event/signal parameter error
    EventParameterError,
    /// 539 - unsupported command parameter
    UnsupportedParameter,
    /// Any other code received from a peer
    Other(u16),
}

impl ReturnCode {
    /// Numeric value of the code
    pub fn as_u16(&self) -> u16 {
        match self {
            ReturnCode::TransactionBeingExecuted => 100,
            ReturnCode::TransactionQueued => 101,
            ReturnCode::TransactionExecuted => 200,
            ReturnCode::ConnectionDeleted => 250,
            ReturnCode::TransientError => 400,
            ReturnCode::PhoneOffHook => 401,
            ReturnCode::PhoneOnHook => 402,
            ReturnCode::InsufficientResourcesNow => 403,
            ReturnCode::InsufficientBandwidthNow => 404,
            ReturnCode::EndpointRestarting => 405,
            ReturnCode::TransactionTimeout => 406,
            ReturnCode::TransactionAborted => 407,
            ReturnCode::InternalOverload => 409,
            ReturnCode::NoEndpointAvailable => 410,
            ReturnCode::EndpointUnknown => 500,
            ReturnCode::EndpointNotReady => 501,
            ReturnCode::EndpointInsufficientResources => 502,
            ReturnCode::WildcardTooComplicated => 503,
            ReturnCode::UnknownCommand => 504,
            ReturnCode::UnsupportedRemoteDescriptor => 505,
            ReturnCode::UnableToSatisfyOptions => 506,
            ReturnCode::UnsupportedFunctionality => 507,
            ReturnCode::ProtocolError => 510,
            ReturnCode::UnrecognizedExtension => 511,
            ReturnCode::IncorrectConnectionId => 515,
            ReturnCode::IncorrectCallId => 516,
            ReturnCode::UnsupportedMode => 517,
            ReturnCode::UnsupportedPackage => 518,
            ReturnCode::NoSuchEventOrSignal => 522,
            ReturnCode::InconsistentLocalOptions => 524,
            ReturnCode::MissingRemoteDescriptor => 527,
            ReturnCode::IncompatibleProtocolVersion => 528,
            ReturnCode::InternalHardwareFailure => 529,
            ReturnCode::UnsupportedLocalOptionValue => 532,
            ReturnCode::EventParameterError => 538,
            ReturnCode::UnsupportedParameter => 539,
            ReturnCode::Other(code) => *code,
        }
    }

    /// Map a numeric code onto the known variants
    pub fn from_u16(code: u16) -> Self {
        match code {
            100 => ReturnCode::TransactionBeingExecuted,
            101 => ReturnCode::TransactionQueued,
            200 => ReturnCode::TransactionExecuted,
            250 => ReturnCode::ConnectionDeleted,
            400 => ReturnCode::TransientError,
            401 => ReturnCode::PhoneOffHook,
            402 => ReturnCode::PhoneOnHook,
            403 => ReturnCode::InsufficientResourcesNow,
            404 => ReturnCode::InsufficientBandwidthNow,
            405 => ReturnCode::EndpointRestarting,
            406 => ReturnCode::TransactionTimeout,
            407 => ReturnCode::TransactionAborted,
            409 => ReturnCode::InternalOverload,
            410 => ReturnCode::NoEndpointAvailable,
            500 => ReturnCode::EndpointUnknown,
            501 => ReturnCode::EndpointNotReady,
            502 => ReturnCode::EndpointInsufficientResources,
            503 => ReturnCode::WildcardTooComplicated,
            504 => ReturnCode::UnknownCommand,
            505 => ReturnCode::UnsupportedRemoteDescriptor,
            506 => ReturnCode::UnableToSatisfyOptions,
            507 => ReturnCode::UnsupportedFunctionality,
            510 => ReturnCode::ProtocolError,
            511 => ReturnCode::UnrecognizedExtension,
            515 => ReturnCode::IncorrectConnectionId,
            516 => ReturnCode::IncorrectCallId,
            517 => ReturnCode::UnsupportedMode,
            518 => ReturnCode::UnsupportedPackage,
            522 => ReturnCode::NoSuchEventOrSignal,
            524 => ReturnCode::InconsistentLocalOptions,
            527 => ReturnCode::MissingRemoteDescriptor,
            528 => ReturnCode::IncompatibleProtocolVersion,
            529 => ReturnCode::InternalHardwareFailure,
            532 => ReturnCode::UnsupportedLocalOptionValue,
            538 => ReturnCode::EventParameterError,
            539 => ReturnCode::UnsupportedParameter,
            other => ReturnCode::Other(other),
        }
    }

    /// Canonical response text
    pub fn reason(&self) -> &'static str {
        match self {
            ReturnCode::TransactionBeingExecuted => "Transaction being executed",
            ReturnCode::TransactionQueued => "Transaction queued",
            ReturnCode::TransactionExecuted => "Transaction executed normally",
            ReturnCode::ConnectionDeleted => "Connection was deleted",
            ReturnCode::TransientError => "Transient error",
            ReturnCode::PhoneOffHook => "Phone is already off hook",
            ReturnCode::PhoneOnHook => "Phone is already on hook",
            ReturnCode::InsufficientResourcesNow => "Insufficient resources available now",
            ReturnCode::InsufficientBandwidthNow => "Insufficient bandwidth now",
            ReturnCode::EndpointRestarting => "Endpoint is restarting",
            ReturnCode::TransactionTimeout => "Transaction timeout",
            ReturnCode::TransactionAborted => "Transaction aborted",
            ReturnCode::InternalOverload => "Internal overload",
            ReturnCode::NoEndpointAvailable => "No endpoint available",
            ReturnCode::EndpointUnknown => "Endpoint unknown",
            ReturnCode::EndpointNotReady => "Endpoint not ready",
            ReturnCode::EndpointInsufficientResources => "Endpoint does not have sufficient resources",
            ReturnCode::WildcardTooComplicated => "All of wildcard too complicated",
            ReturnCode::UnknownCommand => "Unknown or unsupported command",
            ReturnCode::UnsupportedRemoteDescriptor => "Unsupported remote connection descriptor",
            ReturnCode::UnableToSatisfyOptions => "Unable to satisfy local connection options",
            ReturnCode::UnsupportedFunctionality => "Unsupported functionality",
            ReturnCode::ProtocolError => "Protocol error",
            ReturnCode::UnrecognizedExtension => "Unrecognized extension",
            ReturnCode::IncorrectConnectionId => "Incorrect connection-id",
            ReturnCode::IncorrectCallId => "Unknown or incorrect call-id",
            ReturnCode::UnsupportedMode => "Unsupported or invalid mode",
            ReturnCode::UnsupportedPackage => "Unsupported or unknown package",
            ReturnCode::NoSuchEventOrSignal => "No such event or signal",
            ReturnCode::InconsistentLocalOptions => "Internal inconsistency in local connection options",
            ReturnCode::MissingRemoteDescriptor => "Missing remote connection descriptor",
            ReturnCode::IncompatibleProtocolVersion => "Incompatible protocol version",
            ReturnCode::InternalHardwareFailure => "Internal hardware failure",
            ReturnCode::UnsupportedLocalOptionValue => "Unsupported value in local connection options",
            ReturnCode::EventParameterError => "Event or signal parameter error",
            ReturnCode::UnsupportedParameter => "Unsupported command parameter",
            ReturnCode::Other(_) => "",
        }
    }

    /// Provisional (1xx)
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.as_u16())
    }

    /// Success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// Transient failure (4xx)
    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// Permanent failure (5xx)
    pub fn is_permanent(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl From<u16> for ReturnCode {
    fn from(code: u16) -> Self {
        ReturnCode::from_u16(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_map_back() {
        for code in [100u16, 200, 250, 400, 403, 407, 410, 500, 502, 504, 515, 516, 518, 522, 527, 539] {
            let rc = ReturnCode::from_u16(code);
            assert!(!matches!(rc, ReturnCode::Other(_)), "code {} fell through", code);
            assert_eq!(rc.as_u16(), code);
            assert!(!rc.reason().is_empty());
        }
        assert_eq!(ReturnCode::from_u16(599), ReturnCode::Other(599));
    }

    #[test]
    fn test_classes() {
        assert!(ReturnCode::TransactionExecuted.is_success());
        assert!(ReturnCode::ConnectionDeleted.is_success());
        assert!(ReturnCode::InsufficientResourcesNow.is_transient());
        assert!(ReturnCode::EndpointUnknown.is_permanent());
        assert!(ReturnCode::TransactionBeingExecuted.is_provisional());
    }
}
