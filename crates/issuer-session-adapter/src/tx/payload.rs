/*
[INPUT]:  JSON transaction payload built by the UI
[OUTPUT]: Validated entry function payload or a precise validation error
[POS]:    Transaction layer - payload preconditions
[UPDATE]: When payload schema changes
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The only payload type the gateway submits
pub const ENTRY_FUNCTION_PAYLOAD: &str = "entry_function_payload";

/// Each precondition failure is distinct
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload must be an object")]
    NotAnObject,
    #[error("payload type must be \"entry_function_payload\", got {0}")]
    WrongType(String),
    #[error("payload is missing the function field")]
    MissingFunction,
    #[error("function must be a string")]
    FunctionNotString,
    #[error("function must look like <address>::<module>::<function>, got \"{0}\"")]
    MalformedFunction(String),
    #[error("arguments must be an array")]
    ArgumentsNotArray,
    #[error("typeArguments must be an array")]
    TypeArgumentsNotArray,
}

/// `<address>::<module>::<function>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionId {
    pub address: String,
    pub module: String,
    pub name: String,
}

impl FunctionId {
    pub fn parse(function: &str) -> Result<Self, PayloadError> {
        let parts: Vec<&str> = function.split("::").collect();
        match parts.as_slice() {
            [address, module, name]
                if [address, module, name].iter().all(|part| !part.trim().is_empty()) =>
            {
                Ok(Self {
                    address: address.to_string(),
                    module: module.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(PayloadError::MalformedFunction(function.to_string())),
        }
    }
}

/// Entry function call submitted through the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: String,
    #[serde(rename = "typeArguments")]
    pub type_arguments: Vec<Value>,
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    pub fn new(
        function: &str,
        type_arguments: Vec<Value>,
        arguments: Vec<Value>,
    ) -> Result<Self, PayloadError> {
        let payload = Self {
            kind: ENTRY_FUNCTION_PAYLOAD.to_string(),
            function: function.to_string(),
            type_arguments,
            arguments,
        };
        payload.validate()?;
        Ok(payload)
    }

    /// Validate an untyped payload, checking each precondition in order
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        match object.get("type") {
            Some(Value::String(kind)) if kind == ENTRY_FUNCTION_PAYLOAD => {}
            Some(other) => return Err(PayloadError::WrongType(other.to_string())),
            None => return Err(PayloadError::WrongType("nothing".to_string())),
        }

        let function = match object.get("function") {
            None | Some(Value::Null) => return Err(PayloadError::MissingFunction),
            Some(Value::String(function)) => function.clone(),
            Some(_) => return Err(PayloadError::FunctionNotString),
        };
        FunctionId::parse(&function)?;

        let arguments = match object.get("arguments") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(PayloadError::ArgumentsNotArray),
        };
        let type_arguments = match object.get("typeArguments") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Err(PayloadError::TypeArgumentsNotArray),
        };

        Ok(Self {
            kind: ENTRY_FUNCTION_PAYLOAD.to_string(),
            function,
            type_arguments,
            arguments,
        })
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.kind != ENTRY_FUNCTION_PAYLOAD {
            return Err(PayloadError::WrongType(self.kind.clone()));
        }
        FunctionId::parse(&self.function).map(|_| ())
    }

    pub fn function_id(&self) -> Result<FunctionId, PayloadError> {
        FunctionId::parse(&self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "type": "entry_function_payload",
            "function": "0x1::bonding_curve::buy",
            "typeArguments": [],
            "arguments": ["100"],
        })
    }

    #[test]
    fn test_valid_payload() {
        let payload = EntryFunctionPayload::from_value(&valid()).unwrap();
        let id = payload.function_id().unwrap();
        assert_eq!(id.address, "0x1");
        assert_eq!(id.module, "bonding_curve");
        assert_eq!(id.name, "buy");
        assert_eq!(serde_json::to_value(&payload).unwrap(), valid());
    }

    #[rstest]
    #[case(json!("0x1::m::f"), PayloadError::NotAnObject)]
    #[case(json!({"function": "0x1::m::f", "arguments": [], "typeArguments": []}),
        PayloadError::WrongType("nothing".to_string()))]
    #[case(json!({"type": "script_payload", "function": "0x1::m::f", "arguments": [], "typeArguments": []}),
        PayloadError::WrongType("\"script_payload\"".to_string()))]
    #[case(json!({"type": "entry_function_payload", "arguments": [], "typeArguments": []}),
        PayloadError::MissingFunction)]
    #[case(json!({"type": "entry_function_payload", "function": 5, "arguments": [], "typeArguments": []}),
        PayloadError::FunctionNotString)]
    #[case(json!({"type": "entry_function_payload", "function": "0x1::m", "arguments": [], "typeArguments": []}),
        PayloadError::MalformedFunction("0x1::m".to_string()))]
    #[case(json!({"type": "entry_function_payload", "function": "0x1::m::f::g", "arguments": [], "typeArguments": []}),
        PayloadError::MalformedFunction("0x1::m::f::g".to_string()))]
    #[case(json!({"type": "entry_function_payload", "function": "0x1::::f", "arguments": [], "typeArguments": []}),
        PayloadError::MalformedFunction("0x1::::f".to_string()))]
    #[case(json!({"type": "entry_function_payload", "function": "0x1::m::f", "arguments": {}, "typeArguments": []}),
        PayloadError::ArgumentsNotArray)]
    #[case(json!({"type": "entry_function_payload", "function": "0x1::m::f", "arguments": []}),
        PayloadError::TypeArgumentsNotArray)]
    fn test_invalid_payloads(#[case] value: Value, #[case] expected: PayloadError) {
        assert_eq!(EntryFunctionPayload::from_value(&value).unwrap_err(), expected);
    }
}
