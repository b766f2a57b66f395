//! 工具参数的类型化契约
//!
//! 每个工具携带字段 → {type, required, 约束} 的结构化 schema，派发前校验，
//! 校验失败返回结构化的错误列表而不是抛出通用异常。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// 单个字段的约束
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<String>>,
}

impl ParamSpec {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            description: String::new(),
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            one_of: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }

    pub fn one_of(mut self, values: Vec<String>) -> Self {
        self.one_of = Some(values);
        self
    }

    fn check(&self, field: &str, value: &Value, errors: &mut Vec<ValidationError>) {
        if !self.param_type.accepts(value) {
            errors.push(ValidationError::new(
                field,
                format!("expected {}", self.param_type.as_str()),
            ));
            return;
        }
        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        if let (Some(len), Some(min)) = (len, self.min_length) {
            if len < min {
                errors.push(ValidationError::new(field, format!("length {len} < {min}")));
            }
        }
        if let (Some(len), Some(max)) = (len, self.max_length) {
            if len > max {
                errors.push(ValidationError::new(field, format!("length {len} > {max}")));
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum.filter(|min| n < *min) {
                errors.push(ValidationError::new(field, format!("{n} < minimum {min}")));
            }
            if let Some(max) = self.maximum.filter(|max| n > *max) {
                errors.push(ValidationError::new(field, format!("{n} > maximum {max}")));
            }
        }
        if let (Some(allowed), Some(s)) = (&self.one_of, value.as_str()) {
            if !allowed.iter().any(|a| a == s) {
                errors.push(ValidationError::new(
                    field,
                    format!("must be one of: {}", allowed.join(", ")),
                ));
            }
        }
    }
}

/// 字段级校验错误
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: String) -> Self {
        Self {
            field: field.to_string(),
            message,
        }
    }
}

/// 工具参数 schema：字段名 → 约束（BTreeMap 保证输出顺序稳定）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSchema {
    fields: BTreeMap<String, ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 校验参数；null 视为空对象。未声明的字段忽略
    pub fn validate(&self, args: &Value) -> Result<(), Vec<ValidationError>> {
        let empty = serde_json::Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => {
                return Err(vec![ValidationError::new(
                    "$",
                    "arguments must be a JSON object".to_string(),
                )])
            }
        };

        let mut errors = Vec::new();
        for (name, spec) in &self.fields {
            match obj.get(name) {
                None | Some(Value::Null) if spec.required => {
                    errors.push(ValidationError::new(name, "required field missing".to_string()))
                }
                None | Some(Value::Null) => {}
                Some(value) => spec.check(name, value, &mut errors),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// 转为 JSON Schema（供 LLM 生成正确的参数格式）
    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, spec)| {
                let mut prop = json!({ "type": spec.param_type.as_str() });
                if !spec.description.is_empty() {
                    prop["description"] = json!(spec.description);
                }
                if let Some(values) = &spec.one_of {
                    prop["enum"] = json!(values);
                }
                (name.clone(), prop)
            })
            .collect();
        let required: Vec<&String> = self
            .fields
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_schema() -> ParamSchema {
        ParamSchema::new()
            .field(
                "query",
                ParamSpec::new(ParamType::String).required().length(Some(2), Some(50)),
            )
            .field("limit", ParamSpec::new(ParamType::Integer).range(Some(1.0), Some(20.0)))
            .field(
                "source",
                ParamSpec::new(ParamType::String).one_of(vec!["pubmed".into(), "web".into()]),
            )
    }

    #[test]
    fn test_valid_args() {
        let schema = search_schema();
        assert!(schema
            .validate(&json!({"query": "asthma", "limit": 5, "source": "pubmed"}))
            .is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let schema = search_schema();
        let errors = schema
            .validate(&json!({"limit": 99, "source": "ftp"}))
            .unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["limit", "query", "source"]);
    }

    #[test]
    fn test_type_mismatch() {
        let errors = search_schema().validate(&json!({"query": 42})).unwrap_err();
        assert_eq!(errors[0].message, "expected string");
    }

    #[test]
    fn test_non_object_args() {
        let errors = search_schema().validate(&json!("query")).unwrap_err();
        assert_eq!(errors[0].field, "$");
    }

    #[test]
    fn test_empty_schema_accepts_null() {
        assert!(ParamSchema::new().validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_json_schema_output() {
        let schema = search_schema().to_json_schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["source"]["enum"], json!(["pubmed", "web"]));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let schema: ParamSchema = toml::from_str(
            r#"
            [query]
            type = "string"
            required = true
            "#,
        )
        .unwrap();
        assert!(schema.validate(&json!({})).is_err());
    }
}
