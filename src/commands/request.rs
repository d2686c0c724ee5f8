//! Request Model
//!
//! A request is an array whose head names the command and whose tail holds
//! the arguments. Anything else is rejected with [`CommandError::BadRequest`].

use crate::commands::error::CommandError;
use crate::protocol::RespValue;

/// A decoded request, split into command name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Command name exactly as sent; lookups are case-sensitive.
    pub name: String,
    pub args: Vec<RespValue>,
}

impl TryFrom<RespValue> for Request {
    type Error = CommandError;

    fn try_from(value: RespValue) -> Result<Self, Self::Error> {
        let mut items = value.into_array().ok_or(CommandError::BadRequest)?.into_iter();

        let name = match items.next() {
            Some(RespValue::SimpleString(s)) => s,
            Some(RespValue::BulkString(b)) => String::from_utf8_lossy(&b).into_owned(),
            _ => return Err(CommandError::BadRequest),
        };

        Ok(Request {
            name,
            args: items.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_string_head() {
        let request = Request::try_from(RespValue::array(vec![
            RespValue::bulk_string("GET"),
            RespValue::bulk_string("x"),
        ]))
        .unwrap();

        assert_eq!(request.name, "GET");
        assert_eq!(request.args, vec![RespValue::bulk_string("x")]);
    }

    #[test]
    fn test_simple_string_head() {
        let request =
            Request::try_from(RespValue::array(vec![RespValue::simple_string("FLUSH")])).unwrap();

        assert_eq!(request.name, "FLUSH");
        assert!(request.args.is_empty());
    }

    #[test]
    fn test_empty_array_is_bad_request() {
        assert_eq!(
            Request::try_from(RespValue::array(vec![])),
            Err(CommandError::BadRequest)
        );
    }

    #[test]
    fn test_non_string_head_is_bad_request() {
        for head in [
            RespValue::integer(1),
            RespValue::null(),
            RespValue::error("GET"),
            RespValue::array(vec![RespValue::bulk_string("GET")]),
        ] {
            assert_eq!(
                Request::try_from(RespValue::array(vec![head])),
                Err(CommandError::BadRequest)
            );
        }
    }

    #[test]
    fn test_non_array_is_bad_request() {
        assert_eq!(
            Request::try_from(RespValue::bulk_string("GET")),
            Err(CommandError::BadRequest)
        );
        assert_eq!(
            Request::try_from(RespValue::map(vec![])),
            Err(CommandError::BadRequest)
        );
    }
}
