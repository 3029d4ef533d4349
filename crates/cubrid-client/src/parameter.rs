//! Bound statement parameters.

use cubrid_protocol::{DataType, ParamMode};
use cubrid_types::SqlValue;

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    /// Value flows to the server only.
    #[default]
    Input,
    /// Value is filled in by a stored-procedure call.
    Output,
    /// Value is sent and then overwritten by the call's result.
    InputOutput,
}

impl ParameterDirection {
    /// Mode byte written for stored-procedure calls.
    #[must_use]
    pub fn mode(self) -> ParamMode {
        match self {
            Self::Input => ParamMode::In,
            Self::Output => ParamMode::Out,
            Self::InputOutput => ParamMode::InOut,
        }
    }

    /// Whether the server writes back into this parameter.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }
}

/// A parameter bound to one `?` placeholder.
///
/// A declared type of [`DataType::Null`] means "send the value with its own
/// type". Output parameters are overwritten after a stored-procedure call.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter direction.
    pub direction: ParameterDirection,
    /// Declared wire type.
    pub data_type: DataType,
    /// Current value.
    pub value: SqlValue,
}

impl Parameter {
    /// Create a parameter from all of its parts.
    pub fn new(direction: ParameterDirection, data_type: DataType, value: SqlValue) -> Self {
        Self {
            direction,
            data_type,
            value,
        }
    }

    /// An input parameter typed after its value.
    pub fn input(value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        Self::new(ParameterDirection::Input, value.data_type(), value)
    }

    /// An output parameter of the given type, initially NULL.
    #[must_use]
    pub fn output(data_type: DataType) -> Self {
        Self::new(ParameterDirection::Output, data_type, SqlValue::Null)
    }

    /// An input/output parameter typed after its value.
    pub fn input_output(value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        Self::new(ParameterDirection::InputOutput, value.data_type(), value)
    }

    /// Override the declared wire type.
    #[must_use]
    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }
}

impl From<SqlValue> for Parameter {
    fn from(value: SqlValue) -> Self {
        Self::input(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_takes_value_type() {
        let p = Parameter::input(12345678);
        assert_eq!(p.direction, ParameterDirection::Input);
        assert_eq!(p.data_type, DataType::Int);
        assert_eq!(p.value, SqlValue::Int(12345678));
    }

    #[test]
    fn test_output_starts_null() {
        let p = Parameter::output(DataType::String);
        assert!(p.value.is_null());
        assert!(p.direction.is_output());
        assert_eq!(p.direction.mode(), ParamMode::Out);
    }

    #[test]
    fn test_type_override() {
        let p = Parameter::input_output("abc").with_type(DataType::Char);
        assert_eq!(p.data_type, DataType::Char);
        assert_eq!(p.direction.mode(), ParamMode::InOut);
        assert!(!ParameterDirection::Input.is_output());
    }
}
