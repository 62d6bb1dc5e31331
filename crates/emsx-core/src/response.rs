//! Typed views over response messages

use crate::error::EmsxResult;
use crate::message::{Fields, Message};

pub const EMSX_SUCCESS_ROUTES: &str = "EMSX_SUCCESS_ROUTES";
pub const EMSX_FAILED_ROUTES: &str = "EMSX_FAILED_ROUTES";
pub const EMSX_SEQUENCE: &str = "EMSX_SEQUENCE";
pub const EMSX_ROUTE_ID: &str = "EMSX_ROUTE_ID";
pub const ERROR_CODE: &str = "ERROR_CODE";
pub const ERROR_MESSAGE: &str = "ERROR_MESSAGE";
pub const MESSAGE: &str = "MESSAGE";

/// Request-level failure reported by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
}

impl ErrorInfo {
    pub fn from_message(msg: &Message) -> EmsxResult<Self> {
        Ok(Self {
            code: msg.get_element_as_i32(ERROR_CODE)?,
            message: msg.get_element_as_string(ERROR_MESSAGE)?,
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.set(ERROR_CODE, self.code).set(ERROR_MESSAGE, self.message.as_str());
        fields
    }
}

/// An order that was routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteSuccess {
    pub sequence: i32,
    pub route_id: i32,
}

/// An order the broker or service refused to route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFailure {
    pub sequence: i32,
    pub error_code: i32,
    pub error_message: String,
}

/// Outcome of a group route, one entry per order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRouteResult {
    pub successes: Vec<RouteSuccess>,
    pub failures: Vec<RouteFailure>,
    pub message: String,
}

impl GroupRouteResult {
    /// Parse a `GroupRouteEx` message. A missing route list means no entries.
    pub fn from_message(msg: &Message) -> EmsxResult<Self> {
        let successes = read_list(msg, EMSX_SUCCESS_ROUTES, |entry| {
            Ok(RouteSuccess {
                sequence: entry.get_as_i32(EMSX_SEQUENCE)?,
                route_id: entry.get_as_i32(EMSX_ROUTE_ID)?,
            })
        })?;
        let failures = read_list(msg, EMSX_FAILED_ROUTES, |entry| {
            Ok(RouteFailure {
                sequence: entry.get_as_i32(EMSX_SEQUENCE)?,
                error_code: entry.get_as_i32(ERROR_CODE)?,
                error_message: entry.get_as_string(ERROR_MESSAGE)?,
            })
        })?;

        Ok(Self {
            successes,
            failures,
            message: msg.get_element_as_string(MESSAGE)?,
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        for success in &self.successes {
            if let Ok(entry) = fields.append_sequence(EMSX_SUCCESS_ROUTES) {
                entry
                    .set(EMSX_SEQUENCE, success.sequence)
                    .set(EMSX_ROUTE_ID, success.route_id);
            }
        }
        for failure in &self.failures {
            if let Ok(entry) = fields.append_sequence(EMSX_FAILED_ROUTES) {
                entry
                    .set(EMSX_SEQUENCE, failure.sequence)
                    .set(ERROR_CODE, failure.error_code)
                    .set(ERROR_MESSAGE, failure.error_message.as_str());
            }
        }
        fields.set(MESSAGE, self.message.as_str());
        fields
    }
}

fn read_list<T>(
    msg: &Message,
    name: &str,
    read: impl Fn(&Fields) -> EmsxResult<T>,
) -> EmsxResult<Vec<T>> {
    if !msg.has_element(name) {
        return Ok(Vec::new());
    }
    let list = msg.get_element(name)?;
    (0..list.num_values())
        .map(|i| list.get_value_as_sequence(name, i).and_then(&read))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmsxError;
    use crate::message::{names, Element};

    #[test]
    fn test_absent_and_empty_lists_are_equivalent() {
        let mut absent = Fields::new();
        absent.set(MESSAGE, "done");

        let mut empty = Fields::new();
        empty.set(EMSX_FAILED_ROUTES, Element::Array(Vec::new()));
        empty.set(MESSAGE, "done");

        let a = GroupRouteResult::from_message(&Message::new(names::GROUP_ROUTE_EX, absent)).unwrap();
        let b = GroupRouteResult::from_message(&Message::new(names::GROUP_ROUTE_EX, empty)).unwrap();
        assert_eq!(a, b);
        assert!(a.failures.is_empty());
    }

    #[test]
    fn test_parse_mixed_result() {
        let result = GroupRouteResult {
            successes: vec![
                RouteSuccess { sequence: 3734835, route_id: 101 },
                RouteSuccess { sequence: 3734836, route_id: 102 },
            ],
            failures: vec![RouteFailure {
                sequence: 3734837,
                error_code: 12,
                error_message: "broker rejected".to_string(),
            }],
            message: "Route request processed".to_string(),
        };
        let msg = Message::new(names::GROUP_ROUTE_EX, result.to_fields());
        assert_eq!(GroupRouteResult::from_message(&msg).unwrap(), result);
    }

    #[test]
    fn test_failed_routes_without_successes_are_read() {
        let mut fields = Fields::new();
        fields
            .append_sequence(EMSX_FAILED_ROUTES)
            .unwrap()
            .set(EMSX_SEQUENCE, 1)
            .set(ERROR_CODE, 3)
            .set(ERROR_MESSAGE, "unknown order");
        fields.set(MESSAGE, "nothing routed");

        let result = GroupRouteResult::from_message(&Message::new(names::GROUP_ROUTE_EX, fields)).unwrap();
        assert!(result.successes.is_empty());
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn test_missing_status_message_is_an_error() {
        let msg = Message::new(names::GROUP_ROUTE_EX, Fields::new());
        assert_eq!(
            GroupRouteResult::from_message(&msg).unwrap_err(),
            EmsxError::not_found(MESSAGE)
        );
    }

    #[test]
    fn test_error_info() {
        let info = ErrorInfo { code: 99, message: "Invalid sequence".to_string() };
        let msg = Message::new(names::ERROR_INFO, info.to_fields());
        assert_eq!(ErrorInfo::from_message(&msg).unwrap(), info);
    }
}
